use std::{collections::HashMap, fmt, future::Future};

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error};

use crate::error::{CollectorError, Result};

use super::{CloudConfig, RegionsSelector};

/// One region's failed query.
#[derive(Debug)]
pub struct RegionFailure {
    pub region: String,
    pub error: CollectorError,
}

impl fmt::Display for RegionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.region, self.error)
    }
}

/// Aggregate of every region that failed during one fan-out.
#[derive(Debug, Error)]
#[error("failed to retrieve resources for region(s): {}", join_failures(.failures))]
pub struct FanOutError {
    pub failures: Vec<RegionFailure>,
}

impl FanOutError {
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|failure| failure.region.as_str())
    }
}

fn join_failures(failures: &[RegionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Whatever the fan-out gathered, plus the regions that failed.
///
/// Partial data is never silently passed off as complete: when `error` is
/// set, `items` only holds the regions that succeeded.
#[derive(Debug)]
pub struct FanOutResult<K> {
    pub items: Vec<K>,
    pub error: Option<FanOutError>,
}

impl<K> FanOutResult<K> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_parts(self) -> (Vec<K>, Option<FanOutError>) {
        (self.items, self.error)
    }

    /// Strict view: any failed region fails the whole call.
    pub fn into_result(self) -> Result<Vec<K>> {
        match self.error {
            Some(err) => Err(err.into()),
            None => Ok(self.items),
        }
    }
}

/// Runs `query` against every region's client concurrently and concatenates
/// the successful results.
///
/// Order across regions is unspecified; each region's own results keep their
/// order. There is no timeout or retry here: the caller bounds the whole
/// fetch and decides whether partial data is acceptable.
pub async fn multi_region_fetch<T, K, F, Fut>(clients: &HashMap<String, T>, query: F) -> FanOutResult<K>
where
    T: Clone,
    F: Fn(String, T) -> Fut,
    Fut: Future<Output = Result<Vec<K>>>,
{
    let pending = clients.iter().map(|(region, client)| {
        let region = region.clone();
        let request = query(region.clone(), client.clone());
        async move { (region, request.await) }
    });

    let mut items = Vec::new();
    let mut failures = Vec::new();
    for (region, outcome) in join_all(pending).await {
        match outcome {
            Ok(mut batch) => {
                debug!(target: "canopy::regions", %region, count = batch.len(), "region query finished");
                items.append(&mut batch);
            }
            Err(err) => {
                error!(target: "canopy::regions", %region, error = %err, "region query failed");
                failures.push(RegionFailure { region, error: err });
            }
        }
    }

    FanOutResult {
        items,
        error: (!failures.is_empty()).then_some(FanOutError { failures }),
    }
}

/// Per-region clients of one service.
#[derive(Clone)]
pub struct MultiRegionClients<T> {
    clients: HashMap<String, T>,
}

impl<T> MultiRegionClients<T> {
    pub fn new(clients: HashMap<String, T>) -> Self {
        Self { clients }
    }

    /// Builds one client per region the selector reports. When discovery
    /// fails, falls back to a single client for the configured home region.
    pub async fn discover<F>(selector: &dyn RegionsSelector, cfg: &CloudConfig, factory: F) -> Self
    where
        F: Fn(&CloudConfig) -> T,
    {
        let regions = match selector.regions(cfg).await {
            Ok(regions) => regions,
            Err(err) => {
                error!(
                    target: "canopy::regions",
                    region = %cfg.region,
                    error = %err,
                    "falling back to home region after failure to retrieve regions"
                );
                vec![cfg.region.clone()]
            }
        };

        let clients = regions
            .into_iter()
            .map(|region| {
                let client = factory(&cfg.for_region(region.clone()));
                (region, client)
            })
            .collect();

        Self { clients }
    }

    pub fn clients(&self) -> &HashMap<String, T> {
        &self.clients
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}

impl<T: Clone> MultiRegionClients<T> {
    pub async fn fetch<K, F, Fut>(&self, query: F) -> FanOutResult<K>
    where
        F: Fn(String, T) -> Fut,
        Fut: Future<Output = Result<Vec<K>>>,
    {
        multi_region_fetch(&self.clients, query).await
    }
}

impl<T> fmt::Debug for MultiRegionClients<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut regions: Vec<&str> = self.regions().collect();
        regions.sort_unstable();
        f.debug_struct("MultiRegionClients")
            .field("regions", &regions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use async_trait::async_trait;

    use super::*;

    #[derive(Clone, Debug)]
    struct StubClient {
        region: String,
        items: Vec<&'static str>,
        fail: bool,
    }

    impl StubClient {
        async fn list(&self) -> Result<Vec<&'static str>> {
            tokio::task::yield_now().await;
            if self.fail {
                return Err(CollectorError::Fetcher(anyhow::anyhow!("access denied")));
            }
            Ok(self.items.clone())
        }
    }

    fn clients(spec: Vec<(&str, Vec<&'static str>, bool)>) -> HashMap<String, StubClient> {
        spec.into_iter()
            .map(|(region, items, fail)| {
                (
                    region.to_string(),
                    StubClient {
                        region: region.to_string(),
                        items,
                        fail,
                    },
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn aggregates_successes_and_reports_failed_regions() {
        let set = clients(vec![
            ("us-east-1", vec!["a"], false),
            ("eu-west-1", vec!["b"], false),
            ("ap-south-1", vec![], true),
        ]);

        let result = multi_region_fetch(&set, |_, client| async move { client.list().await }).await;

        let items: HashSet<_> = result.items.iter().copied().collect();
        assert_eq!(items, HashSet::from(["a", "b"]));
        let err = result.error.expect("one region failed");
        assert_eq!(err.regions().collect::<Vec<_>>(), vec!["ap-south-1"]);
        assert!(err.to_string().contains("ap-south-1"));
        assert!(err.to_string().contains("access denied"));
    }

    #[tokio::test]
    async fn preserves_order_within_a_region() {
        let set = clients(vec![("us-east-1", vec!["x", "y", "z"], false)]);

        let result = multi_region_fetch(&set, |_, client| async move { client.list().await }).await;

        assert!(result.is_complete());
        assert_eq!(result.items, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn query_receives_matching_region() {
        let set = clients(vec![("us-east-1", vec![], false), ("eu-west-1", vec![], false)]);

        let result = multi_region_fetch(&set, |region, client| async move {
            assert_eq!(region, client.region);
            Ok(vec![region])
        })
        .await;

        assert_eq!(result.items.len(), 2);
    }

    #[tokio::test]
    async fn strict_view_fails_on_any_region() {
        let set = clients(vec![("us-east-1", vec!["a"], false), ("eu-west-1", vec![], true)]);

        let result = multi_region_fetch(&set, |_, client| async move { client.list().await }).await;

        assert!(matches!(result.into_result(), Err(CollectorError::FanOut(_))));
    }

    #[tokio::test]
    async fn empty_client_set_yields_nothing() {
        let set: HashMap<String, StubClient> = HashMap::new();
        let result = multi_region_fetch(&set, |_, client| async move { client.list().await }).await;
        assert!(result.items.is_empty());
        assert!(result.is_complete());
    }

    struct FixedSelector(std::result::Result<Vec<&'static str>, &'static str>);

    #[async_trait]
    impl RegionsSelector for FixedSelector {
        async fn regions(&self, _cfg: &CloudConfig) -> Result<Vec<String>> {
            match &self.0 {
                Ok(regions) => Ok(regions.iter().map(|r| r.to_string()).collect()),
                Err(msg) => Err(CollectorError::RegionDiscovery(msg.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn discover_builds_a_client_per_region() {
        let selector = FixedSelector(Ok(vec!["us-east-1", "eu-west-1"]));
        let cfg = CloudConfig::new("us-east-1");

        let clients = MultiRegionClients::discover(&selector, &cfg, |cfg| Arc::new(cfg.region.clone())).await;

        let mut regions: Vec<&str> = clients.regions().collect();
        regions.sort_unstable();
        assert_eq!(regions, vec!["eu-west-1", "us-east-1"]);
        assert_eq!(clients.clients()["eu-west-1"].as_str(), "eu-west-1");
    }

    #[tokio::test]
    async fn discover_falls_back_to_home_region() {
        let selector = FixedSelector(Err("throttled"));
        let cfg = CloudConfig::new("eu-central-1");

        let clients = MultiRegionClients::discover(&selector, &cfg, |cfg| cfg.region.clone()).await;

        assert_eq!(clients.regions().collect::<Vec<_>>(), vec!["eu-central-1"]);
    }
}
