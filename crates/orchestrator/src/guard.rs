use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-portfolio single-flight guards for the whole
/// snapshot -> decision -> action -> ledger pipeline.
///
/// A tick that finds a portfolio's guard held skips that portfolio instead
/// of blocking, so slow venue calls cannot queue cycles unboundedly. The
/// permit releases on every exit path, including timeout and panic, because
/// release is tied to drop.
#[derive(Default)]
pub struct CycleGuards {
    guards: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

/// RAII permit for one portfolio's cycle.
pub struct CyclePermit {
    _guard: OwnedMutexGuard<()>,
}

impl CycleGuards {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the portfolio's guard without waiting. `None` means another
    /// cycle is in flight and the caller should skip this tick.
    #[must_use]
    pub fn try_acquire(&self, portfolio_id: i64) -> Option<CyclePermit> {
        let guard = {
            let mut guards = self.guards.lock().expect("guard map poisoned");
            guards
                .entry(portfolio_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        guard
            .try_lock_owned()
            .ok()
            .map(|permit| CyclePermit { _guard: permit })
    }
}
