//! Rolling-window accumulator: each delta self-subtracts once its window
//! elapses, without storing the full delta history.

use crate::scheduler::{ExpiryHandle, Scheduler};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};

/// A signed accumulator whose value always equals the sum of contributions
/// added within the last `duration`. A zero duration means contributions
/// never expire (the lifetime view).
///
/// One mutex per instance serialises the add and the scheduled subtract, so
/// a value snapshot is always consistent with the last completed write.
/// Cloning shares the underlying accumulator.
#[derive(Clone)]
pub struct WindowedSum {
    duration: Duration,
    scheduler: Scheduler,
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    value: f64,
    next_id: u64,
    pending: HashMap<u64, ExpiryHandle>,
}

impl WindowedSum {
    pub fn new(duration: Duration, scheduler: Scheduler) -> Self {
        Self {
            duration,
            scheduler,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether this window keeps contributions forever.
    pub fn is_unbounded(&self) -> bool {
        self.duration.is_zero()
    }

    /// Add `delta` to the accumulator and, for bounded windows, schedule its
    /// expiration. The expiration handle is registered before returning.
    pub fn add(&self, delta: f64) {
        let mut inner = self.inner.lock();
        inner.value += delta;
        if self.duration.is_zero() {
            return;
        }

        let id = inner.next_id;
        inner.next_id += 1;

        // The callback contends on the same mutex held here, so it cannot
        // observe the accumulator before this add has fully registered.
        let state = Arc::clone(&self.inner);
        let handle = self.scheduler.schedule(self.duration, move || {
            let mut inner = state.lock();
            inner.value -= delta;
            inner.pending.remove(&id);
        });
        inner.pending.insert(id, handle);
    }

    /// Void every pending expiration without altering the current value:
    /// still-pending contributions become permanent. Expirations that already
    /// fired have applied their subtraction and are unaffected. Idempotent.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        for handle in inner.pending.values() {
            handle.cancel();
        }
        inner.pending.clear();
    }

    /// Snapshot read of the current value.
    pub fn value(&self) -> f64 {
        self.inner.lock().value
    }

    /// Number of contributions still awaiting expiration.
    pub fn pending_expirations(&self) -> usize {
        self.inner.lock().pending.len()
    }
}
