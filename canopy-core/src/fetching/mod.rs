//! Fetcher abstraction and the registry the orchestrator drives.
//!
//! A [`Fetcher`] queries one external source and publishes whatever it finds
//! through the [`ResourcePublisher`] carried in its [`FetchContext`]. The
//! publisher stamps each resource with the current cycle, so a fetcher never
//! builds a [`ResourceInfo`](canopy_model::ResourceInfo) itself.

pub mod condition;
pub mod cycle_cache;
pub mod publisher;
pub mod registry;

use std::fmt;

use async_trait::async_trait;
use canopy_model::{CycleMetadata, Resource};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use condition::{Condition, FnCondition, LeaderCondition, LeaderElection};
pub use cycle_cache::CycleCache;
pub use publisher::ResourcePublisher;
pub use registry::{FetcherRegistry, FetchersMap, FetchersUpdater, ParsedFetcher, RegisteredFetcher};

/// A unit of work that queries one data source per cycle.
///
/// Implementations must return promptly once `ctx.cancel` fires and must be
/// safe to abandon mid-flight: the orchestrator stops waiting for a fetcher
/// after its timeout but never aborts the task. A fetcher that ignores the
/// token keeps running (and holding its connections) in the background.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, ctx: FetchContext) -> Result<()>;

    /// Release held resources. Called once during registry teardown and
    /// must tolerate being called again.
    fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Everything a fetcher needs for a single invocation.
#[derive(Clone)]
pub struct FetchContext {
    pub cycle: CycleMetadata,
    pub cancel: CancellationToken,
    pub publisher: ResourcePublisher,
}

impl FetchContext {
    pub fn new(cycle: CycleMetadata, cancel: CancellationToken, publisher: ResourcePublisher) -> Self {
        Self {
            cycle,
            cancel,
            publisher,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn publish<R>(&self, resource: R) -> Result<()>
    where
        R: Resource + 'static,
    {
        self.publisher.publish(resource).await
    }
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("cycle", &self.cycle)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("publisher", &self.publisher)
            .finish()
    }
}
