use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};

use crate::models::FetcherSpec;

pub const ENV_CONFIG_PATH: &str = "CANOPY_CONFIG";
pub const ENV_PERIOD: &str = "CANOPY_PERIOD";
pub const ENV_FETCHER_TIMEOUT: &str = "CANOPY_FETCHER_TIMEOUT";
pub const ENV_OUTPUT_CAPACITY: &str = "CANOPY_OUTPUT_CAPACITY";
pub const ENV_DEFAULT_REGION: &str = "CANOPY_DEFAULT_REGION";

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    /// Human duration, e.g. `"4h"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetcher_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_capacity: Option<usize>,
    #[serde(default)]
    pub cloud: FileCloudConfig,
    #[serde(default)]
    pub fetchers: Vec<FetcherSpec>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileCloudConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_region: Option<String>,
}

/// Overrides read from the environment and `.env` files.
///
/// Values stay raw strings here; parsing happens during composition so a bad
/// value is reported against the variable that carried it.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub period: Option<String>,
    pub fetcher_timeout: Option<String>,
    pub output_capacity: Option<String>,
    pub default_region: Option<String>,
}

impl EnvConfig {
    /// Process environment first, `.env` entries second.
    pub fn gather(env_file: &HashMap<String, String>, use_process_env: bool) -> Self {
        let lookup = |name: &str| -> Option<String> {
            let process = if use_process_env {
                std::env::var(name).ok()
            } else {
                None
            };
            process
                .or_else(|| env_file.get(name).cloned())
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            config_path: lookup(ENV_CONFIG_PATH).map(PathBuf::from),
            period: lookup(ENV_PERIOD),
            fetcher_timeout: lookup(ENV_FETCHER_TIMEOUT),
            output_capacity: lookup(ENV_OUTPUT_CAPACITY),
            default_region: lookup(ENV_DEFAULT_REGION),
        }
    }
}
