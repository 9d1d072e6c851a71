use std::{collections::HashSet, fmt, time::Duration};

use canopy_model::kinds;
use thiserror::Error;

use crate::models::{CollectorConfig, FetcherSpec};

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("fetcher entry #{index} has an empty name")]
    EmptyFetcherName { index: usize },
    #[error("fetcher {name} is configured more than once")]
    DuplicateFetcher { name: String },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} ({hint})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

pub fn apply_guard_rails(config: &CollectorConfig) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    ensure_positive("period", config.period)?;
    ensure_positive("fetcher_timeout", config.fetcher_timeout)?;
    if config.output_capacity == 0 {
        return Err(ConfigGuardRailError::Zero {
            field: "output_capacity",
        });
    }

    if config.fetcher_timeout > config.period {
        warnings.push_with_hint(
            format!(
                "fetcher_timeout ({}) exceeds period ({}); collection cycles may overlap",
                humantime::format_duration(config.fetcher_timeout),
                humantime::format_duration(config.period),
            ),
            "Lower fetcher_timeout or raise period",
        );
    }

    check_fetchers(&config.fetchers, &mut warnings)?;

    Ok(warnings)
}

fn ensure_positive(field: &'static str, value: Duration) -> Result<(), ConfigGuardRailError> {
    if value.is_zero() {
        Err(ConfigGuardRailError::Zero { field })
    } else {
        Ok(())
    }
}

fn check_fetchers(
    fetchers: &[FetcherSpec],
    warnings: &mut ConfigWarnings,
) -> Result<(), ConfigGuardRailError> {
    let mut seen = HashSet::new();
    for (index, spec) in fetchers.iter().enumerate() {
        if spec.name.trim().is_empty() {
            return Err(ConfigGuardRailError::EmptyFetcherName { index });
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(ConfigGuardRailError::DuplicateFetcher {
                name: spec.name.clone(),
            });
        }
        if spec.enabled && spec.kind() == kinds::FILE_SYSTEM && spec.paths.is_empty() {
            warnings.push(format!("fetcher {} has no paths and will publish nothing", spec.name));
        }
    }

    if fetchers.iter().all(|spec| !spec.enabled) {
        warnings.push_with_hint(
            "No fetchers enabled; cycles will run but collect nothing",
            "Add a [[fetchers]] entry to the configuration file",
        );
    }

    Ok(())
}
