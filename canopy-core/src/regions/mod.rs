//! Region discovery and multi-region fan-out.
//!
//! Fetchers for regional cloud services build one client per active region
//! through [`MultiRegionClients::discover`] and query them all at once with
//! [`multi_region_fetch`]. Region discovery is cached per selector instance;
//! a failed discovery is never cached.

mod fanout;
mod selector;

use serde::{Deserialize, Serialize};

pub use fanout::{FanOutError, FanOutResult, MultiRegionClients, RegionFailure, multi_region_fetch};
pub use selector::{
    AllRegions, CachedRegionSelector, CurrentRegion, DescribeRegions, InstanceMetadata,
    OptInStatus, RegionDescription, RegionDiscovery, RegionsSelector,
};

/// Region used when nothing better is known.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings shared by every regional client of one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Home region; also the fallback when discovery fails.
    pub region: String,
}

impl CloudConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    pub fn for_region(&self, region: impl Into<String>) -> Self {
        let mut cfg = self.clone();
        cfg.region = region.into();
        cfg
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REGION)
    }
}
