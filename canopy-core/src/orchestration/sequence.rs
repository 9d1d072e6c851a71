use std::sync::atomic::{AtomicI64, Ordering};

use canopy_model::CycleMetadata;
use chrono::Utc;

/// Hands out cycle sequence numbers.
///
/// Sequences are Unix seconds at cycle start, bumped past the previous value
/// when two cycles start within the same second, so they are strictly
/// increasing for the life of the generator.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    last: AtomicI64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_cycle(&self) -> CycleMetadata {
        let now = Utc::now().timestamp();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        CycleMetadata::new(now.max(previous + 1))
    }
}
