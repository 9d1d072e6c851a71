use std::{fmt, sync::Arc};

use canopy_model::{CycleMetadata, Resource, ResourceInfo};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{CollectorError, Result};

/// Per-invocation handle onto the shared resource stream.
///
/// Every envelope sent through a publisher carries the cycle it was created
/// for. Sends race the fetcher's cancellation token, so back-pressure from a
/// slow evaluator never outlives a cancelled or timed-out fetcher.
#[derive(Clone)]
pub struct ResourcePublisher {
    fetcher: Arc<str>,
    cycle: CycleMetadata,
    sender: mpsc::Sender<ResourceInfo>,
    cancel: CancellationToken,
}

impl ResourcePublisher {
    pub fn new(
        fetcher: impl Into<Arc<str>>,
        cycle: CycleMetadata,
        sender: mpsc::Sender<ResourceInfo>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher: fetcher.into(),
            cycle,
            sender,
            cancel,
        }
    }

    pub fn fetcher(&self) -> &str {
        &self.fetcher
    }

    pub fn cycle(&self) -> CycleMetadata {
        self.cycle
    }

    pub async fn publish<R>(&self, resource: R) -> Result<()>
    where
        R: Resource + 'static,
    {
        self.publish_shared(Arc::new(resource)).await
    }

    pub async fn publish_shared(&self, resource: Arc<dyn Resource>) -> Result<()> {
        let info = ResourceInfo::new(resource, self.cycle);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CollectorError::Cancelled(self.fetcher.to_string())),
            sent = self.sender.send(info) => sent.map_err(|_| CollectorError::OutputClosed),
        }
    }

    /// Publishes a batch, stopping at the first failure.
    pub async fn publish_all<I>(&self, resources: I) -> Result<usize>
    where
        I: IntoIterator<Item = Arc<dyn Resource>>,
    {
        let mut sent = 0;
        for resource in resources {
            self.publish_shared(resource).await?;
            sent += 1;
        }
        Ok(sent)
    }
}

impl fmt::Debug for ResourcePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePublisher")
            .field("fetcher", &self.fetcher)
            .field("cycle", &self.cycle)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use canopy_model::ResourceMetadata;

    use super::*;

    #[derive(Debug)]
    struct Number(i64);

    impl Resource for Number {
        fn metadata(&self) -> canopy_model::ModelResult<ResourceMetadata> {
            Ok(ResourceMetadata::new(self.0.to_string(), "number"))
        }

        fn data(&self) -> serde_json::Value {
            serde_json::json!(self.0)
        }
    }

    #[tokio::test]
    async fn stamps_envelopes_with_cycle() {
        let (tx, mut rx) = mpsc::channel(4);
        let publisher = ResourcePublisher::new("numbers", CycleMetadata::new(9), tx, CancellationToken::new());

        publisher.publish(Number(1)).await.unwrap();
        publisher.publish(Number(2)).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.cycle_metadata.sequence, 9);
        assert_eq!(second.cycle_metadata.sequence, 9);
        assert_eq!(second.data(), serde_json::json!(2));
    }

    #[tokio::test]
    async fn closed_stream_is_reported() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let publisher = ResourcePublisher::new("numbers", CycleMetadata::new(1), tx, CancellationToken::new());

        let err = publisher.publish(Number(1)).await.unwrap_err();
        assert!(matches!(err, CollectorError::OutputClosed));
    }

    #[tokio::test]
    async fn cancellation_unblocks_full_stream() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let publisher = ResourcePublisher::new("numbers", CycleMetadata::new(1), tx, cancel.clone());

        publisher.publish(Number(1)).await.unwrap();
        cancel.cancel();

        let err = publisher.publish(Number(2)).await.unwrap_err();
        assert!(matches!(err, CollectorError::Cancelled(name) if name == "numbers"));
    }
}
