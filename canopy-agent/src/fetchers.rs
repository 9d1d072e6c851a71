use std::sync::Arc;

use anyhow::{Context, bail};
use canopy_config::{CollectorConfig, FetcherSpec};
use canopy_core::{FetcherRegistry, FileSystemFetcher, ParsedFetcher, RegisteredFetcher};
use canopy_model::kinds;

/// Turns the enabled fetcher entries into a populated registry.
pub fn build_registry(config: &CollectorConfig) -> anyhow::Result<FetcherRegistry> {
    let parsed = config
        .enabled_fetchers()
        .map(parse_fetcher)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let registry = FetcherRegistry::new();
    registry
        .register_all(parsed)
        .context("failed to register fetchers")?;
    Ok(registry)
}

fn parse_fetcher(spec: &FetcherSpec) -> anyhow::Result<ParsedFetcher> {
    let registered = match spec.kind() {
        kinds::FILE_SYSTEM => {
            RegisteredFetcher::new(Arc::new(FileSystemFetcher::new(spec.paths.iter().cloned())))
        }
        other => bail!("fetcher {} has unsupported kind {other}", spec.name),
    };
    Ok(ParsedFetcher::new(spec.name.clone(), registered))
}
