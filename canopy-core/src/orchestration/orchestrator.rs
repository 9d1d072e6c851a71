use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use canopy_model::{CycleMetadata, ResourceInfo};
use parking_lot::Mutex;
use tokio::{
    sync::mpsc,
    task::JoinSet,
    time::{MissedTickBehavior, interval},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, warn};

use crate::{
    error::{CollectorError, Result},
    fetching::{FetchContext, FetcherRegistry, ResourcePublisher},
};

use super::{config::OrchestratorConfig, sequence::SequenceGenerator};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorState {
    Created,
    Running,
    Stopped,
}

impl OrchestratorState {
    pub fn as_str(self) -> &'static str {
        match self {
            OrchestratorState::Created => "created",
            OrchestratorState::Running => "running",
            OrchestratorState::Stopped => "stopped",
        }
    }
}

/// How a single fetcher's turn in a cycle ended, when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Completed,
    /// A condition vetoed the fetcher for this cycle.
    Skipped,
}

/// Per-fetcher results of one cycle.
#[derive(Debug)]
pub struct CycleSummary {
    pub cycle: CycleMetadata,
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, CollectorError)>,
    pub elapsed: Duration,
}

impl CycleSummary {
    fn new(cycle: CycleMetadata) -> Self {
        Self {
            cycle,
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn failure(&self, fetcher: &str) -> Option<&CollectorError> {
        self.failed
            .iter()
            .find(|(name, _)| name == fetcher)
            .map(|(_, err)| err)
    }
}

/// Triggers every registered fetcher on a fixed interval.
///
/// The first cycle starts as soon as [`Orchestrator::run`] is called. Later
/// cycles start on a repeating timer that does not wait for the previous
/// cycle to finish, so a cycle slower than the interval overlaps the next
/// one. Each fetcher runs in its own task, bounded by the fetcher timeout and
/// isolated from panics; a failing fetcher only loses its own data for that
/// cycle.
///
/// Lifecycle is `Created -> Running -> Stopped`. A stopped orchestrator
/// cannot be restarted.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<FetcherRegistry>,
    output: Mutex<Option<mpsc::Sender<ResourceInfo>>>,
    state: Mutex<OrchestratorState>,
    shutdown: CancellationToken,
    sequence: SequenceGenerator,
    iterations: TaskTracker,
    cycles: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<FetcherRegistry>,
        output: mpsc::Sender<ResourceInfo>,
    ) -> Self {
        Self {
            config,
            registry,
            output: Mutex::new(Some(output)),
            state: Mutex::new(OrchestratorState::Created),
            shutdown: CancellationToken::new(),
            sequence: SequenceGenerator::new(),
            iterations: TaskTracker::new(),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<FetcherRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.lock()
    }

    /// Number of cycles launched so far.
    pub fn cycles_started(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Runs cycles until `cancel` fires or [`Orchestrator::stop`] is called.
    ///
    /// Cancellation propagates to every in-flight fetcher. On exit, waits for
    /// running cycles for at most the fetcher timeout before returning.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.transition(OrchestratorState::Created, OrchestratorState::Running)?;
        info!(
            target: "canopy::orchestrator",
            interval = ?self.config.interval,
            fetcher_timeout = ?self.config.fetcher_timeout,
            "fetchers manager started"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target: "canopy::orchestrator", "fetchers manager cancelled");
                    self.shutdown.cancel();
                    break;
                }
                _ = self.shutdown.cancelled() => {
                    info!(target: "canopy::orchestrator", "fetchers manager stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(runner) = self.cycle_runner() else {
                        break;
                    };
                    let cycle = self.next_cycle();
                    self.iterations.spawn(async move {
                        runner.fetch_iteration(cycle).await;
                    });
                }
            }
        }

        *self.state.lock() = OrchestratorState::Stopped;

        self.iterations.close();
        if tokio::time::timeout(self.config.fetcher_timeout, self.iterations.wait())
            .await
            .is_err()
        {
            warn!(target: "canopy::orchestrator", "in-flight cycles still running after shutdown");
        }

        Ok(())
    }

    /// Runs a single cycle immediately and waits for it to finish.
    pub async fn run_once(&self) -> Result<CycleSummary> {
        let runner = self.cycle_runner().ok_or(CollectorError::OutputClosed)?;
        let cycle = self.next_cycle();
        Ok(runner.fetch_iteration(cycle).await)
    }

    /// Triggers every registered fetcher for `cycle` and waits for all of
    /// them to finish or be abandoned.
    pub async fn fetch_iteration(&self, cycle: CycleMetadata) -> Result<CycleSummary> {
        let runner = self.cycle_runner().ok_or(CollectorError::OutputClosed)?;
        Ok(runner.fetch_iteration(cycle).await)
    }

    /// Runs one fetcher under the timeout and panic boundary.
    pub async fn fetch_one(&self, name: &str, cycle: CycleMetadata) -> Result<FetchOutcome> {
        let runner = self.cycle_runner().ok_or(CollectorError::OutputClosed)?;
        runner.fetch_one(name, cycle).await
    }

    /// Stops the run loop, signals every in-flight fetcher, stops all
    /// registered fetchers and closes the output stream.
    ///
    /// The stream closes once the last in-flight fetcher drops its publisher.
    /// Calling `stop` again is a no-op.
    pub fn stop(&self) {
        *self.state.lock() = OrchestratorState::Stopped;
        self.shutdown.cancel();

        let output = self.output.lock().take();
        if output.is_some() {
            self.registry.stop();
            info!(target: "canopy::orchestrator", "orchestrator stopped");
        }
    }

    fn next_cycle(&self) -> CycleMetadata {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.sequence.next_cycle()
    }

    fn cycle_runner(&self) -> Option<CycleRunner> {
        let output = self.output.lock().clone()?;
        Some(CycleRunner {
            registry: Arc::clone(&self.registry),
            output,
            timeout: self.config.fetcher_timeout,
            shutdown: self.shutdown.clone(),
        })
    }

    fn transition(&self, from: OrchestratorState, to: OrchestratorState) -> Result<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(CollectorError::InvalidState {
                expected: from.as_str(),
                actual: state.as_str(),
            });
        }
        *state = to;
        Ok(())
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("state", &self.state())
            .field("cycles_started", &self.cycles_started())
            .field("output_open", &self.output.lock().is_some())
            .field("shutdown_cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

/// Everything one cycle needs, detached from the orchestrator so cycles can
/// run as independent tasks.
#[derive(Clone)]
struct CycleRunner {
    registry: Arc<FetcherRegistry>,
    output: mpsc::Sender<ResourceInfo>,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl CycleRunner {
    async fn fetch_iteration(self, cycle: CycleMetadata) -> CycleSummary {
        self.registry.update().await;

        let keys = self.registry.keys();
        info!(
            target: "canopy::orchestrator",
            fetchers = keys.len(),
            "manager triggered fetching"
        );
        info!(target: "canopy::orchestrator", cycle = cycle.sequence, "cycle has started");

        let start = Instant::now();
        let mut tasks = JoinSet::new();
        for key in keys {
            let runner = self.clone();
            tasks.spawn(async move {
                let outcome = runner.fetch_one(&key, cycle).await;
                (key, outcome)
            });
        }

        let mut summary = CycleSummary::new(cycle);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(FetchOutcome::Completed))) => summary.succeeded.push(name),
                Ok((name, Ok(FetchOutcome::Skipped))) => summary.skipped.push(name),
                Ok((name, Err(err))) => {
                    error!(
                        target: "canopy::orchestrator",
                        fetcher = %name,
                        cycle = cycle.sequence,
                        error = %err,
                        "error running fetcher"
                    );
                    summary.failed.push((name, err));
                }
                Err(err) => {
                    error!(target: "canopy::orchestrator", error = %err, "fetcher supervisor task failed");
                }
            }
        }
        summary.elapsed = start.elapsed();

        info!(
            target: "canopy::orchestrator",
            cycle = cycle.sequence,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            succeeded = summary.succeeded.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "cycle resource fetching has ended"
        );
        summary
    }

    async fn fetch_one(&self, name: &str, cycle: CycleMetadata) -> Result<FetchOutcome> {
        // Conditions run outside the fetcher task; a panicking one still fails
        // this fetcher rather than the whole supervisor task.
        match catch_unwind(AssertUnwindSafe(|| self.registry.should_run(name))) {
            Ok(true) => {}
            Ok(false) => return Ok(FetchOutcome::Skipped),
            Err(payload) => {
                return Err(CollectorError::Panicked {
                    fetcher: name.to_string(),
                    payload: panic_message(payload),
                });
            }
        }

        let cancel = self.shutdown.child_token();
        let publisher = ResourcePublisher::new(name, cycle, self.output.clone(), cancel.clone());
        let ctx = FetchContext::new(cycle, cancel.clone(), publisher);

        // The fetcher runs in its own task so a panic surfaces as a JoinError
        // and a timed-out fetcher can be left behind without being aborted.
        let registry = Arc::clone(&self.registry);
        let key = name.to_string();
        let mut handle = tokio::spawn(async move { registry.run(&key, ctx).await });

        let outcome = tokio::select! {
            joined = &mut handle => match joined {
                Ok(result) => result.map(|()| FetchOutcome::Completed),
                Err(err) if err.is_panic() => Err(CollectorError::Panicked {
                    fetcher: name.to_string(),
                    payload: panic_message(err.into_panic()),
                }),
                Err(_) => Err(CollectorError::Cancelled(name.to_string())),
            },
            _ = tokio::time::sleep(self.timeout) => Err(CollectorError::Timeout {
                fetcher: name.to_string(),
                after: self.timeout,
            }),
            _ = self.shutdown.cancelled() => Err(CollectorError::Cancelled(name.to_string())),
        };

        // An abandoned fetcher is expected to notice this and wind down.
        cancel.cancel();
        outcome
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
