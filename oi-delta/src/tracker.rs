//! Per-key tracker composing several rolling windows over one delta stream.

use crate::{
    render::{Style, ValueFormat},
    scheduler::Scheduler,
    window::WindowedSum,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::time::Duration;

/// Which fields [`MultiWindowTracker::snapshot`] renders. Explicit instead of
/// default-argument toggling; `ignore` drops individual bounded windows.
#[derive(Clone, Debug, Default)]
pub struct SnapshotFields {
    pub price: bool,
    pub last: bool,
    pub windows: bool,
    pub total: bool,
    pub ticks: bool,
    pub average: bool,
    pub ignore: Vec<Duration>,
}

impl SnapshotFields {
    /// Everything: the per-tick level line.
    pub fn full() -> Self {
        Self {
            price: true,
            last: true,
            windows: true,
            total: true,
            ticks: true,
            average: true,
            ignore: Vec::new(),
        }
    }

    /// Price, lifetime total, ticks, and average: the session profile rows.
    pub fn profile() -> Self {
        Self {
            price: true,
            total: true,
            ticks: true,
            average: true,
            ..Self::default()
        }
    }
}

/// Tracks one delta series across every configured window simultaneously,
/// keyed by the price bucket it belongs to (or a sentinel for global series).
pub struct MultiWindowTracker {
    bucket_price: f64,
    tick_interval: Duration,
    windows: IndexMap<Duration, WindowedSum>,
    state: Mutex<TickState>,
}

#[derive(Default)]
struct TickState {
    last_delta: f64,
    ticks: u64,
}

impl MultiWindowTracker {
    /// Create a tracker with one window per duration. Duplicate durations
    /// collapse into a single window; insertion order is preserved for
    /// rendering.
    pub fn new(
        bucket_price: f64,
        durations: &[Duration],
        tick_interval: Duration,
        scheduler: &Scheduler,
    ) -> Self {
        let mut windows = IndexMap::with_capacity(durations.len());
        for &duration in durations {
            windows
                .entry(duration)
                .or_insert_with(|| WindowedSum::new(duration, scheduler.clone()));
        }
        Self {
            bucket_price,
            tick_interval,
            windows,
            state: Mutex::new(TickState::default()),
        }
    }

    pub fn bucket_price(&self) -> f64 {
        self.bucket_price
    }

    /// Record one delta: updates last-delta and the tick count exactly once,
    /// then feeds every window. All windows reflect the delta before this
    /// returns, so the very next render sees a consistent snapshot.
    pub fn add(&self, delta: f64) {
        {
            let mut state = self.state.lock();
            state.last_delta = delta;
            state.ticks += 1;
        }
        for window in self.windows.values() {
            window.add(delta);
        }
    }

    pub fn last_delta(&self) -> f64 {
        self.state.lock().last_delta
    }

    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }

    /// Handle to the window of the given duration, sharing its accumulator.
    pub fn window(&self, duration: Duration) -> Option<WindowedSum> {
        self.windows.get(&duration).cloned()
    }

    /// Handle to the unbounded lifetime window, if one is configured.
    pub fn lifetime(&self) -> Option<WindowedSum> {
        self.window(Duration::ZERO)
    }

    /// Current lifetime value, zero when no lifetime window is configured.
    pub fn lifetime_value(&self) -> f64 {
        self.lifetime().map(|window| window.value()).unwrap_or(0.0)
    }

    /// Void pending expirations on every window. The alert-reset primitive.
    pub fn cancel_all(&self) {
        for window in self.windows.values() {
            window.cancel();
        }
    }

    /// Pure formatting of the tracker's current state; never blocks on
    /// scheduling. Average is lifetime value over `max(ticks, 1)`.
    pub fn snapshot(&self, fields: &SnapshotFields, style: &Style) -> String {
        let (last_delta, ticks) = {
            let state = self.state.lock();
            (state.last_delta, state.ticks)
        };

        let mut parts = Vec::new();
        if fields.price {
            parts.push(style.price(self.bucket_price));
        }
        if fields.last {
            parts.push(format!(
                "last: {}",
                style.value(last_delta, self.tick_interval)
            ));
        }
        for (&duration, window) in &self.windows {
            if duration.is_zero() || !fields.windows || fields.ignore.contains(&duration) {
                continue;
            }
            parts.push(format!(
                "{}s: {}",
                duration.as_secs(),
                style.value(window.value(), duration)
            ));
        }
        if fields.total {
            if let Some(lifetime) = self.lifetime() {
                parts.push(format!(
                    "total: {}",
                    style.value(lifetime.value(), Duration::ZERO)
                ));
            }
        }
        if fields.ticks {
            parts.push(format!("ticks: {ticks:>4}"));
        }
        if fields.average {
            if let Some(lifetime) = self.lifetime() {
                let average = lifetime.value() / ticks.max(1) as f64;
                parts.push(format!(
                    "avg: {}",
                    style.value_with(
                        average,
                        self.tick_interval,
                        ValueFormat {
                            threshold: Some(style.threshold() / 2.0),
                            ..ValueFormat::default()
                        }
                    )
                ));
            }
        }
        parts.join("  ")
    }
}
