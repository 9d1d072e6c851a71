//! # Canopy Core
//!
//! Collection engine of the Canopy inventory collector.
//!
//! ## Overview
//!
//! - **Fetching**: the [`Fetcher`] trait, run-time [`Condition`]s and the
//!   [`FetcherRegistry`] that holds named fetchers.
//! - **Orchestration**: the [`Orchestrator`] fires a collection cycle on a
//!   fixed interval, running every eligible fetcher concurrently under a
//!   timeout and a panic boundary.
//! - **Regions**: cached region discovery and a fan-out executor that queries
//!   one client per region and merges the results.
//! - **Fetchers**: built-in fetchers usable without cloud credentials.
//!
//! Resources flow out of the engine through a single bounded
//! `tokio::sync::mpsc` channel whose receiver belongs to the evaluator.
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use canopy_core::{FetcherRegistry, FileSystemFetcher, Orchestrator, OrchestratorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> canopy_core::Result<()> {
//! let registry = FetcherRegistry::new();
//! registry.register("file-system", Arc::new(FileSystemFetcher::new(["/etc/hosts"])), vec![])?;
//!
//! let (tx, _rx) = tokio::sync::mpsc::channel(1024);
//! let config = OrchestratorConfig::new(Duration::from_secs(60), Duration::from_secs(10));
//! let orchestrator = Orchestrator::new(config, Arc::new(registry), tx);
//! orchestrator.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```
#![allow(missing_docs)]

pub mod error;
pub mod fetchers;
pub mod fetching;
pub mod orchestration;
pub mod regions;

pub use error::{CollectorError, Result};
pub use fetchers::{FileResource, FileSystemFetcher};
pub use fetching::{
    Condition, CycleCache, FetchContext, Fetcher, FetcherRegistry, FetchersMap, FetchersUpdater, FnCondition,
    LeaderCondition, LeaderElection, ParsedFetcher, RegisteredFetcher, ResourcePublisher,
};
pub use orchestration::{
    CycleSummary, FetchOutcome, Orchestrator, OrchestratorConfig, OrchestratorState,
    SequenceGenerator,
};
pub use regions::{
    CachedRegionSelector, CloudConfig, FanOutError, FanOutResult, MultiRegionClients,
    RegionsSelector, multi_region_fetch,
};
