use std::fmt;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, error};

use crate::error::{CollectorError, Result};

use super::CloudConfig;

/// Resolves the regions a fetcher should cover.
#[async_trait]
pub trait RegionsSelector: Send + Sync {
    async fn regions(&self, cfg: &CloudConfig) -> Result<Vec<String>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptInStatus {
    OptInNotRequired,
    OptedIn,
    NotOptedIn,
}

impl OptInStatus {
    pub fn is_enabled(self) -> bool {
        !matches!(self, OptInStatus::NotOptedIn)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionDescription {
    pub name: String,
    pub opt_in_status: OptInStatus,
}

impl RegionDescription {
    pub fn enabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            opt_in_status: OptInStatus::OptInNotRequired,
        }
    }
}

/// Provider "list regions" call.
#[async_trait]
pub trait DescribeRegions: Send + Sync {
    async fn describe_regions(&self, cfg: &CloudConfig) -> anyhow::Result<Vec<RegionDescription>>;
}

/// Provider instance metadata service, queried for the region the agent
/// itself runs in.
#[async_trait]
pub trait InstanceMetadata: Send + Sync {
    async fn current_region(&self, cfg: &CloudConfig) -> anyhow::Result<String>;
}

/// One uncached region discovery strategy.
#[async_trait]
pub trait RegionDiscovery: Send + Sync {
    fn name(&self) -> &'static str;

    async fn discover(&self, cfg: &CloudConfig) -> Result<Vec<String>>;
}

/// Every region enabled for the account.
#[derive(Debug)]
pub struct AllRegions<D> {
    client: D,
}

impl<D> AllRegions<D> {
    pub fn new(client: D) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<D: DescribeRegions> RegionDiscovery for AllRegions<D> {
    fn name(&self) -> &'static str {
        "all-regions"
    }

    async fn discover(&self, cfg: &CloudConfig) -> Result<Vec<String>> {
        let described = self
            .client
            .describe_regions(cfg)
            .await
            .map_err(|err| CollectorError::RegionDiscovery(format!("describe regions: {err:#}")))?;

        Ok(described
            .into_iter()
            .filter(|region| region.opt_in_status.is_enabled())
            .map(|region| region.name)
            .collect())
    }
}

/// Only the region of the current execution environment.
#[derive(Debug)]
pub struct CurrentRegion<M> {
    client: M,
}

impl<M> CurrentRegion<M> {
    pub fn new(client: M) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<M: InstanceMetadata> RegionDiscovery for CurrentRegion<M> {
    fn name(&self) -> &'static str {
        "current-region"
    }

    async fn discover(&self, cfg: &CloudConfig) -> Result<Vec<String>> {
        let region = self
            .client
            .current_region(cfg)
            .await
            .map_err(|err| CollectorError::RegionDiscovery(format!("instance metadata: {err:#}")))?;

        if region.is_empty() {
            return Err(CollectorError::RegionDiscovery(
                "instance metadata returned an empty region".into(),
            ));
        }
        Ok(vec![region])
    }
}

/// Runs a discovery strategy at most once successfully per instance.
///
/// Concurrent callers during the first discovery wait for it and share its
/// result. A failed discovery leaves the cell empty, so the next caller
/// issues a fresh request instead of receiving a cached failure. Successful
/// results are kept for the life of the selector.
pub struct CachedRegionSelector<S> {
    strategy: S,
    cache: OnceCell<Vec<String>>,
}

impl<S> CachedRegionSelector<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            cache: OnceCell::new(),
        }
    }

    pub fn cached(&self) -> Option<&[String]> {
        self.cache.get().map(Vec::as_slice)
    }
}

impl<D: DescribeRegions> CachedRegionSelector<AllRegions<D>> {
    pub fn all_regions(client: D) -> Self {
        Self::new(AllRegions::new(client))
    }
}

impl<M: InstanceMetadata> CachedRegionSelector<CurrentRegion<M>> {
    pub fn current_region(client: M) -> Self {
        Self::new(CurrentRegion::new(client))
    }
}

#[async_trait]
impl<S: RegionDiscovery> RegionsSelector for CachedRegionSelector<S> {
    async fn regions(&self, cfg: &CloudConfig) -> Result<Vec<String>> {
        let strategy = self.strategy.name();
        let regions = self
            .cache
            .get_or_try_init(|| async {
                debug!(target: "canopy::regions", strategy, "discovering regions for the first time");
                self.strategy.discover(cfg).await.inspect_err(|err| {
                    error!(target: "canopy::regions", strategy, error = %err, "region discovery failed");
                })
            })
            .await?;

        debug!(target: "canopy::regions", strategy, ?regions, "enabled regions for account");
        Ok(regions.clone())
    }
}

impl<S: RegionDiscovery> fmt::Debug for CachedRegionSelector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedRegionSelector")
            .field("strategy", &self.strategy.name())
            .field("cached", &self.cache.get())
            .finish()
    }
}
