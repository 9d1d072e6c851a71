use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use canopy_core::{
    CollectorError, FetchContext, Fetcher, FetcherRegistry, Orchestrator, OrchestratorConfig,
    OrchestratorState, Result,
};
use canopy_model::{ModelResult, Resource, ResourceInfo, ResourceMetadata};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Item {
    fetcher: &'static str,
    index: usize,
}

impl Resource for Item {
    fn metadata(&self) -> ModelResult<ResourceMetadata> {
        Ok(ResourceMetadata::new(format!("{}-{}", self.fetcher, self.index), "test"))
    }

    fn data(&self) -> serde_json::Value {
        serde_json::json!({ "fetcher": self.fetcher, "index": self.index })
    }
}

/// Emits a fixed number of items per cycle.
struct Emitter {
    name: &'static str,
    count: usize,
}

#[async_trait]
impl Fetcher for Emitter {
    async fn fetch(&self, ctx: FetchContext) -> Result<()> {
        for index in 0..self.count {
            ctx.publish(Item {
                fetcher: self.name,
                index,
            })
            .await?;
        }
        Ok(())
    }
}

/// Counts invocations, then sleeps for `busy` before returning.
struct Slow {
    starts: Arc<AtomicUsize>,
    busy: Duration,
}

#[async_trait]
impl Fetcher for Slow {
    async fn fetch(&self, ctx: FetchContext) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = tokio::time::sleep(self.busy) => Ok(()),
            _ = ctx.cancel.cancelled() => Err(CollectorError::Cancelled("slow".into())),
        }
    }
}

struct Failing;

#[async_trait]
impl Fetcher for Failing {
    async fn fetch(&self, _ctx: FetchContext) -> Result<()> {
        Err(anyhow::anyhow!("access denied").into())
    }
}

fn start(
    registry: FetcherRegistry,
    interval: Duration,
    timeout: Duration,
) -> (Arc<Orchestrator>, mpsc::Receiver<ResourceInfo>) {
    let (tx, rx) = mpsc::channel(64);
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::new(interval, timeout),
        Arc::new(registry),
        tx,
    );
    (Arc::new(orchestrator), rx)
}

#[tokio::test(start_paused = true)]
async fn first_cycle_delivers_every_fetchers_output_with_one_sequence() {
    let registry = FetcherRegistry::new();
    registry
        .register("a", Arc::new(Emitter { name: "a", count: 1 }), vec![])
        .unwrap();
    registry
        .register("b", Arc::new(Emitter { name: "b", count: 2 }), vec![])
        .unwrap();
    let (orchestrator, mut rx) = start(registry, Duration::from_secs(10), Duration::from_secs(2));

    let cancel = CancellationToken::new();
    let running = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        async move { orchestrator.run(cancel).await }
    });

    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(rx.recv().await.unwrap());
    }

    let sequence = received[0].cycle_metadata.sequence;
    assert!(received.iter().all(|info| info.cycle_metadata.sequence == sequence));
    let mut ids: Vec<String> = received
        .iter()
        .map(|info| info.metadata().unwrap().id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a-0", "b-0", "b-1"]);

    cancel.cancel();
    running.await.unwrap().unwrap();
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn later_cycles_carry_increasing_sequences() {
    let registry = FetcherRegistry::new();
    registry
        .register("a", Arc::new(Emitter { name: "a", count: 1 }), vec![])
        .unwrap();
    let (orchestrator, mut rx) = start(registry, Duration::from_secs(10), Duration::from_secs(2));

    let cancel = CancellationToken::new();
    let running = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        async move { orchestrator.run(cancel).await }
    });

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    let third = rx.recv().await.unwrap();

    assert!(first.cycle_metadata.sequence < second.cycle_metadata.sequence);
    assert!(second.cycle_metadata.sequence < third.cycle_metadata.sequence);
    assert!(orchestrator.cycles_started() >= 3);

    cancel.cancel();
    running.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn slow_cycle_does_not_delay_the_timer() {
    let starts = Arc::new(AtomicUsize::new(0));
    let registry = FetcherRegistry::new();
    registry
        .register(
            "slow",
            Arc::new(Slow {
                starts: Arc::clone(&starts),
                busy: Duration::from_secs(25),
            }),
            vec![],
        )
        .unwrap();
    let (orchestrator, _rx) = start(registry, Duration::from_secs(10), Duration::from_secs(30));
    assert!(orchestrator.config().allows_overlap());

    let cancel = CancellationToken::new();
    let running = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        async move { orchestrator.run(cancel).await }
    });

    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(starts.load(Ordering::SeqCst), 3);

    cancel.cancel();
    running.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn external_cancellation_reaches_running_fetchers() {
    let starts = Arc::new(AtomicUsize::new(0));
    let registry = FetcherRegistry::new();
    registry
        .register(
            "slow",
            Arc::new(Slow {
                starts: Arc::clone(&starts),
                busy: Duration::from_secs(3600),
            }),
            vec![],
        )
        .unwrap();
    let (orchestrator, _rx) = start(registry, Duration::from_secs(10), Duration::from_secs(7200));

    let cancel = CancellationToken::new();
    let running = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        async move { orchestrator.run(cancel).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    let before = tokio::time::Instant::now();
    cancel.cancel();
    running.await.unwrap().unwrap();

    // The loop returns as soon as the in-flight cycle observes cancellation,
    // well before either the fetcher or its timeout would finish.
    assert!(before.elapsed() < Duration::from_secs(1));
    assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
}

#[tokio::test]
async fn failures_are_reported_per_fetcher() {
    let registry = FetcherRegistry::new();
    registry.register("broken", Arc::new(Failing), vec![]).unwrap();
    registry
        .register("ok", Arc::new(Emitter { name: "ok", count: 2 }), vec![])
        .unwrap();
    let (orchestrator, mut rx) = start(registry, Duration::from_secs(10), Duration::from_secs(2));

    let summary = orchestrator.run_once().await.unwrap();

    assert_eq!(summary.succeeded, vec!["ok"]);
    let failure = summary.failure("broken").unwrap();
    assert!(matches!(failure, CollectorError::Fetcher(_)));
    assert_eq!(failure.to_string(), "access denied");

    let mut delivered = 0;
    while rx.try_recv().is_ok() {
        delivered += 1;
    }
    assert_eq!(delivered, 2);
}

#[tokio::test]
async fn stop_releases_the_output_stream() {
    let registry = FetcherRegistry::new();
    registry
        .register("a", Arc::new(Emitter { name: "a", count: 1 }), vec![])
        .unwrap();
    let (orchestrator, mut rx) = start(registry, Duration::from_secs(10), Duration::from_secs(2));

    orchestrator.run_once().await.unwrap();
    orchestrator.stop();

    assert!(rx.recv().await.is_some());
    assert!(rx.recv().await.is_none());

    let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, CollectorError::InvalidState { .. }));
}

#[tokio::test]
async fn empty_registry_runs_idle_cycles() {
    let (orchestrator, mut rx) = start(
        FetcherRegistry::new(),
        Duration::from_secs(10),
        Duration::from_secs(2),
    );

    let summary = orchestrator.run_once().await.unwrap();

    assert!(summary.succeeded.is_empty());
    assert!(summary.failed.is_empty());
    assert!(rx.try_recv().is_err());
}
