use std::{fmt, future::Future};

use canopy_model::CycleMetadata;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;

struct Cached<T> {
    sequence: i64,
    value: T,
}

/// Caches one value per collection cycle.
///
/// Several fetchers often need the same expensive lookup (account aliases,
/// organization structure). The first caller in a cycle performs it while
/// holding the lock; everyone else in that cycle reuses the result. If a
/// refresh fails, the last good value is served instead and the next caller
/// in the same cycle tries again.
pub struct CycleCache<T> {
    state: Mutex<Option<Cached<T>>>,
}

impl<T> Default for CycleCache<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }
}

impl<T: Clone> CycleCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_value<F, Fut>(&self, cycle: CycleMetadata, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut guard = self.state.lock().await;

        if let Some(cached) = guard.as_ref()
            && cached.sequence >= cycle.sequence
        {
            return Ok(cached.value.clone());
        }

        match fetch().await {
            Ok(value) => {
                *guard = Some(Cached {
                    sequence: cycle.sequence,
                    value: value.clone(),
                });
                Ok(value)
            }
            Err(err) => match guard.as_ref() {
                Some(cached) => {
                    warn!(
                        cycle = cycle.sequence,
                        cached_cycle = cached.sequence,
                        error = %err,
                        "failed to refresh cycle cache, serving previous value"
                    );
                    Ok(cached.value.clone())
                }
                None => Err(err),
            },
        }
    }
}

impl<T> fmt::Debug for CycleCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached_cycle = self
            .state
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|cached| cached.sequence));
        f.debug_struct("CycleCache")
            .field("cached_cycle", &cached_cycle)
            .finish()
    }
}
