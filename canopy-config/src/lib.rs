//! Configuration loading for the Canopy collector.
//!
//! Settings come from a TOML file (explicit path, `CANOPY_CONFIG`, or one of
//! the default locations) with `CANOPY_*` environment variables and `.env`
//! entries layered on top. Validation separates hard errors from
//! [`ConfigWarnings`] that the caller is expected to log.
#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{CollectorConfig, ConfigMetadata, DEFAULT_OUTPUT_CAPACITY, FetcherSpec};
pub use sources::{EnvConfig, FileCloudConfig, FileConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
