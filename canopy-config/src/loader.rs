use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use canopy_core::CloudConfig;
use thiserror::Error;
use tracing::debug;

use crate::{
    models::{CollectorConfig, ConfigMetadata, DEFAULT_OUTPUT_CAPACITY},
    sources::{
        ENV_FETCHER_TIMEOUT, ENV_OUTPUT_CAPACITY, ENV_PERIOD, EnvConfig, FileConfig,
    },
    validation::{self, ConfigGuardRailError, ConfigWarnings},
};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["canopy.toml", "config/canopy.toml"];

#[derive(Debug, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Read `CANOPY_*` variables from the process environment. When off, only
    /// an explicit env file contributes overrides.
    pub process_env: bool,
}

impl Default for ConfigLoaderOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            env_file: None,
            process_env: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Ignore the process environment and the implicit `.env` lookup.
    pub fn isolated(mut self) -> Self {
        self.options.process_env = false;
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (env_file, env_file_loaded) = self.read_env_file()?;
        let env = EnvConfig::gather(&env_file, self.options.process_env);

        let (file_config, config_path) = self.load_file_config(&env)?;

        let (config, warnings) = compose_config(
            file_config,
            env,
            ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        )?;

        Ok(ConfigLoad { config, warnings })
    }

    /// Entries of the env file without touching the process environment.
    /// A missing file is not an error.
    fn read_env_file(&self) -> Result<(HashMap<String, String>, bool), ConfigLoadError> {
        let iter = match &self.options.env_file {
            Some(path) => dotenvy::from_path_iter(path),
            None if self.options.process_env => dotenvy::dotenv_iter(),
            None => return Ok((HashMap::new(), false)),
        };

        let iter = match iter {
            Ok(iter) => iter,
            Err(dotenvy::Error::Io(_)) => return Ok((HashMap::new(), false)),
            Err(err) => return Err(err.into()),
        };

        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item?;
            vars.insert(key, value);
        }
        Ok((vars, true))
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env.config_path {
            source.env = Some(from_env.clone());
        } else {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists());
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        debug!(path = %path.display(), ?provenance, "loading configuration file");
        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<(CollectorConfig, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if metadata.config_path.is_none() {
        warnings.push_with_hint(
            "No canopy.toml detected; using defaults and environment variables",
            "Pass --config or set CANOPY_CONFIG to point at a configuration file",
        );
    }

    let FileConfig {
        period: file_period,
        fetcher_timeout: file_timeout,
        output_capacity: file_capacity,
        cloud: file_cloud,
        fetchers,
    } = file_config.unwrap_or_default();

    let defaults = CollectorConfig::default();

    let period = resolve_duration(ENV_PERIOD, env.period, "period", file_period)?
        .unwrap_or(defaults.period);
    let fetcher_timeout =
        resolve_duration(ENV_FETCHER_TIMEOUT, env.fetcher_timeout, "fetcher_timeout", file_timeout)?
            .unwrap_or(defaults.fetcher_timeout);

    let output_capacity = match env.output_capacity {
        Some(raw) => raw.parse().map_err(|_| ConfigLoadError::InvalidNumber {
            field: ENV_OUTPUT_CAPACITY,
            value: raw,
        })?,
        None => file_capacity.unwrap_or(DEFAULT_OUTPUT_CAPACITY),
    };

    let mut cloud = CloudConfig::default();
    if let Some(region) = env.default_region.or(file_cloud.default_region) {
        cloud.region = region;
    }

    let config = CollectorConfig {
        period,
        fetcher_timeout,
        output_capacity,
        cloud,
        fetchers,
        metadata,
    };

    warnings.extend(validation::apply_guard_rails(&config)?);

    Ok((config, warnings))
}

/// Environment wins over the file. Errors name whichever source supplied the
/// bad value.
fn resolve_duration(
    env_name: &'static str,
    env_value: Option<String>,
    file_field: &'static str,
    file_value: Option<String>,
) -> Result<Option<Duration>, ConfigLoadError> {
    let (field, raw) = match (env_value, file_value) {
        (Some(raw), _) => (env_name, raw),
        (None, Some(raw)) => (file_field, raw),
        (None, None) => return Ok(None),
    };

    humantime::parse_duration(&raw)
        .map(Some)
        .map_err(|source| ConfigLoadError::InvalidDuration {
            field,
            value: raw,
            source,
        })
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid duration '{value}' for {field}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("invalid number '{value}' for {field}")]
    InvalidNumber { field: &'static str, value: String },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        self.default
            .as_ref()
            .map(|path| (path.clone(), ConfigPathProvenance::Default))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(self, ConfigPathProvenance::Explicit | ConfigPathProvenance::Env)
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: CollectorConfig,
    pub warnings: ConfigWarnings,
}
