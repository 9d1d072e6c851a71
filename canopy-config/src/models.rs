use std::{path::PathBuf, time::Duration};

use canopy_core::{CloudConfig, OrchestratorConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_OUTPUT_CAPACITY: usize = 1024;

/// One configured fetcher instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FetcherSpec {
    /// Registry key; must be unique.
    pub name: String,
    /// Implementation to build. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Paths inspected by the `file-system` kind.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<PathBuf>,
}

fn enabled_by_default() -> bool {
    true
}

impl FetcherSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            enabled: true,
            paths: Vec::new(),
        }
    }

    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.name)
    }
}

/// Fully resolved collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub period: Duration,
    pub fetcher_timeout: Duration,
    pub output_capacity: usize,
    pub cloud: CloudConfig,
    pub fetchers: Vec<FetcherSpec>,
    pub metadata: ConfigMetadata,
}

impl CollectorConfig {
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig::new(self.period, self.fetcher_timeout)
    }

    pub fn enabled_fetchers(&self) -> impl Iterator<Item = &FetcherSpec> {
        self.fetchers.iter().filter(|spec| spec.enabled)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            period: OrchestratorConfig::DEFAULT_INTERVAL,
            fetcher_timeout: OrchestratorConfig::DEFAULT_FETCHER_TIMEOUT,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            cloud: CloudConfig::default(),
            fetchers: Vec::new(),
            metadata: ConfigMetadata::default(),
        }
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
