use std::time::Duration;

/// Timing knobs for the orchestrator.
///
/// Values arrive already validated from the configuration loader; the
/// orchestrator treats them as opaque.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Time between the start of two consecutive cycles.
    pub interval: Duration,
    /// Longest any single fetcher may run before it is abandoned.
    pub fetcher_timeout: Duration,
}

impl OrchestratorConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);
    pub const DEFAULT_FETCHER_TIMEOUT: Duration = Duration::from_secs(10 * 60);

    pub fn new(interval: Duration, fetcher_timeout: Duration) -> Self {
        Self {
            interval,
            fetcher_timeout,
        }
    }

    /// A timeout longer than the interval lets cycles overlap.
    pub fn allows_overlap(&self) -> bool {
        self.fetcher_timeout > self.interval
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL, Self::DEFAULT_FETCHER_TIMEOUT)
    }
}
