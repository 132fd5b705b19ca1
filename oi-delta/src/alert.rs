//! Threshold alerting over a dedicated lookback window.
//!
//! State machine: Idle -> Breached -> Cooldown -> Idle. Breached is the
//! transient transition in which the notification is emitted and the lookback
//! window is reset; the watch then sits in Cooldown until the suppression
//! period elapses.

use crate::{
    config::TrackerConfig,
    error::NotifyError,
    render::group_thousands,
    scheduler::Scheduler,
    tracker::MultiWindowTracker,
};
use async_trait::async_trait;
use derive_more::Display;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

const POSITIVE_MARKER: &str = "\u{1f539}"; // 🔹
const NEGATIVE_MARKER: &str = "\u{1f538}"; // 🔸

/// Delivery target for alert notifications. Failures are non-fatal.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Steady states of the watch. The Breached transition never persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Phase {
    Idle,
    Cooldown,
}

/// One threshold breach, captured at the moment of transition.
#[derive(Clone, Debug)]
pub struct AlertEvent {
    pub market: String,
    pub price: f64,
    /// Price move since the previous alert (or watch start).
    pub price_move: f64,
    /// Windowed delta magnitude that crossed the threshold.
    pub value: f64,
    /// Time actually covered by the window, capped at the lookback.
    pub covered: Duration,
    pub min_price: f64,
    pub max_price: f64,
    /// Direction-streak markers: one per consecutive same-sign breach.
    pub streak: String,
}

impl AlertEvent {
    /// Markdown notification body, also printed to the console.
    pub fn render(&self) -> String {
        format!(
            "*{}* - {:.1} (*{}*)\noi: {} in {:.0}s {}\nmin/max: {:.1}/{:.1} ({:.1})",
            self.market,
            self.price,
            group_thousands(self.price_move, 1, true),
            group_thousands(self.value, 0, true),
            self.covered.as_secs_f64(),
            self.streak,
            self.min_price,
            self.max_price,
            self.max_price - self.min_price,
        )
    }
}

struct AlertState {
    phase: Phase,
    reference: Instant,
    reference_price: Option<f64>,
    min_price: f64,
    max_price: f64,
    streak: String,
}

/// Watches a single lookback window over the global delta stream and fires a
/// notification when its absolute value crosses the threshold, then
/// suppresses further breaches for the cooldown period.
pub struct AlertWatch {
    market: String,
    lookback: Duration,
    threshold: f64,
    cooldown: Duration,
    tick_interval: Duration,
    scheduler: Scheduler,
    sink: Arc<dyn NotificationSink>,
    tracker: Mutex<MultiWindowTracker>,
    state: Arc<Mutex<AlertState>>,
}

impl AlertWatch {
    pub fn new(
        market: impl Into<String>,
        config: &TrackerConfig,
        scheduler: Scheduler,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let lookback = config.alert_lookback();
        let tracker = MultiWindowTracker::new(0.0, &[lookback], config.tick_interval(), &scheduler);
        Self {
            market: market.into(),
            lookback,
            threshold: config.alert_threshold,
            cooldown: config.alert_cooldown(),
            tick_interval: config.tick_interval(),
            scheduler,
            sink,
            tracker: Mutex::new(tracker),
            state: Arc::new(Mutex::new(AlertState {
                phase: Phase::Idle,
                reference: Instant::now(),
                reference_price: None,
                min_price: f64::MAX,
                max_price: f64::MIN,
                streak: String::new(),
            })),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Current value of the lookback window.
    pub fn lookback_value(&self) -> f64 {
        let tracker = self.tracker.lock();
        tracker
            .window(self.lookback)
            .map_or(0.0, |window| window.value())
    }

    /// Feed one delta and evaluate the threshold. Returns the breach event
    /// when the watch transitions out of Idle; the notification has already
    /// been attempted by then (failure is logged, never propagated).
    pub async fn observe(&self, delta: f64, price: f64) -> Option<AlertEvent> {
        let value = {
            let tracker = self.tracker.lock();
            tracker.add(delta);
            tracker
                .window(self.lookback)
                .map_or(0.0, |window| window.value())
        };

        let event = {
            let mut state = self.state.lock();
            if state.reference_price.is_none() {
                state.reference_price = Some(price);
                state.min_price = price;
                state.max_price = price;
            }
            state.min_price = state.min_price.min(price);
            state.max_price = state.max_price.max(price);

            if state.phase == Phase::Cooldown || value.abs() < self.threshold {
                None
            } else {
                let marker = if value > 0.0 {
                    POSITIVE_MARKER
                } else {
                    NEGATIVE_MARKER
                };
                let opposite = if value > 0.0 {
                    NEGATIVE_MARKER
                } else {
                    POSITIVE_MARKER
                };
                if state.streak.contains(opposite) {
                    state.streak.clear();
                }
                state.streak.push_str(marker);

                let now = Instant::now();
                let event = AlertEvent {
                    market: self.market.clone(),
                    price,
                    price_move: price - state.reference_price.unwrap_or(price),
                    value,
                    covered: now.duration_since(state.reference).min(self.lookback),
                    min_price: state.min_price,
                    max_price: state.max_price,
                    streak: state.streak.clone(),
                };

                state.phase = Phase::Cooldown;
                state.reference = now;
                state.reference_price = Some(price);
                state.min_price = price;
                state.max_price = price;
                Some(event)
            }
        };
        let event = event?;

        // Reset the lookback: freeze pending decays, then restart counting
        // from zero. A reset is a hard boundary, so the tracker is replaced
        // rather than zeroed in place.
        {
            let mut tracker = self.tracker.lock();
            tracker.cancel_all();
            *tracker =
                MultiWindowTracker::new(0.0, &[self.lookback], self.tick_interval, &self.scheduler);
        }

        tracing::info!(
            market = %self.market,
            value = event.value,
            "alert threshold reached"
        );
        if let Err(err) = self.sink.notify(&event.render()).await {
            tracing::warn!(%err, "alert notification failed; entering cooldown regardless");
        }

        let state = Arc::clone(&self.state);
        self.scheduler.schedule(self.cooldown, move || {
            state.lock().phase = Phase::Idle;
        });

        Some(event)
    }
}
