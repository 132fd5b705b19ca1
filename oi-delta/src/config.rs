//! Runtime configuration for the tracker. Every knob is explicit and passed
//! into components at construction; defaults mirror the historical tracker
//! settings.

use crate::error::OiDeltaError;
use serde::Deserialize;
use std::time::Duration;

/// All numeric knobs recognised by the engine. Validation failures are fatal
/// at startup and never raised mid-run.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds between ticker polls.
    pub tick_interval_secs: f64,
    /// Delta-per-second magnitude above which rendered values are
    /// highlighted green/red.
    pub display_threshold: f64,
    /// Short rolling window, seconds.
    pub short_window_secs: f64,
    /// Long rolling window, seconds.
    pub long_window_secs: f64,
    /// Price quantisation step defining bucket boundaries.
    pub bucket_step: f64,
    /// Ticks per session rotation (profile summary cadence).
    pub session_ticks: u64,
    /// Alert lookback window, seconds.
    pub alert_lookback_secs: f64,
    /// Absolute windowed delta above which an alert fires.
    pub alert_threshold: f64,
    /// Alert suppression period after a breach, seconds.
    pub alert_cooldown_secs: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5.0,
            display_threshold: 5_000.0,
            short_window_secs: 30.0,
            long_window_secs: 150.0,
            bucket_step: 10.0,
            session_ticks: 180,
            alert_lookback_secs: 300.0,
            alert_threshold: 5e6,
            alert_cooldown_secs: 60.0,
        }
    }
}

impl TrackerConfig {
    /// Reject configurations the engine cannot run with. Called once before
    /// the ingestion loop starts.
    pub fn validate(&self) -> Result<(), OiDeltaError> {
        fn positive(name: &str, value: f64) -> Result<(), OiDeltaError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(OiDeltaError::Config(format!(
                    "{name} must be positive and finite, got {value}"
                )))
            }
        }

        positive("tick_interval_secs", self.tick_interval_secs)?;
        positive("display_threshold", self.display_threshold)?;
        positive("short_window_secs", self.short_window_secs)?;
        positive("long_window_secs", self.long_window_secs)?;
        positive("bucket_step", self.bucket_step)?;
        positive("alert_lookback_secs", self.alert_lookback_secs)?;
        positive("alert_threshold", self.alert_threshold)?;

        if self.alert_cooldown_secs < 0.0 || !self.alert_cooldown_secs.is_finite() {
            return Err(OiDeltaError::Config(format!(
                "alert_cooldown_secs must be non-negative and finite, got {}",
                self.alert_cooldown_secs
            )));
        }
        if self.session_ticks == 0 {
            return Err(OiDeltaError::Config(
                "session_ticks must be at least 1".to_string(),
            ));
        }
        if self.short_window_secs == self.long_window_secs {
            return Err(OiDeltaError::Config(format!(
                "window durations must be unique, got {}s twice",
                self.short_window_secs
            )));
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval_secs)
    }

    pub fn short_window(&self) -> Duration {
        Duration::from_secs_f64(self.short_window_secs)
    }

    pub fn long_window(&self) -> Duration {
        Duration::from_secs_f64(self.long_window_secs)
    }

    pub fn alert_lookback(&self) -> Duration {
        Duration::from_secs_f64(self.alert_lookback_secs)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.alert_cooldown_secs)
    }

    /// Window durations tracked per bucket: short, long, and the unbounded
    /// lifetime window.
    pub fn window_durations(&self) -> Vec<Duration> {
        vec![self.short_window(), self.long_window(), Duration::ZERO]
    }
}
