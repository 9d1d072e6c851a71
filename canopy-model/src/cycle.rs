use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a single collection cycle.
///
/// Created once per orchestrator tick and attached to every resource emitted
/// during that tick, so downstream evaluation can group findings by run.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CycleMetadata {
    pub sequence: i64,
}

impl CycleMetadata {
    pub const fn new(sequence: i64) -> Self {
        Self { sequence }
    }
}

impl fmt::Display for CycleMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cycle {}", self.sequence)
    }
}
