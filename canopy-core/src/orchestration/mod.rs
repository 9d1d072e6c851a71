//! Cycle-based collection scheduler.

pub mod config;
mod orchestrator;
mod sequence;

pub use config::OrchestratorConfig;
pub use orchestrator::{CycleSummary, FetchOutcome, Orchestrator, OrchestratorState};
pub use sequence::SequenceGenerator;
