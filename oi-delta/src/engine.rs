//! Per-tick pipeline: delta computation, bucket fan-out, alert evaluation,
//! and console rendering. One engine instance serves one exchange market and
//! is driven by a single-threaded poll loop.

use crate::{
    alert::{AlertEvent, AlertWatch, NotificationSink},
    config::TrackerConfig,
    error::{OiDeltaError, SourceError},
    registry::BucketRegistry,
    render::{Style, ValueFormat, group_thousands},
    scheduler::Scheduler,
    tracker::SnapshotFields,
};
use async_trait::async_trait;
use derive_more::Constructor;
use itertools::Itertools;
use std::{sync::Arc, time::Duration};

/// One ticker observation from a market data source.
#[derive(Clone, Copy, Debug, PartialEq, Constructor)]
pub struct Tick {
    /// Raw open interest reported by the exchange.
    pub open_interest: f64,
    /// Mid or mark price used for bucket discretisation.
    pub price: f64,
}

/// Source of ticker observations. Any failure is transient: the driving loop
/// skips the tick, logs, and continues at the next interval.
#[async_trait]
pub trait MarketSource: Send {
    /// Label used in rendered output and alert messages, e.g. `bitmex:XBTUSD`.
    fn label(&self) -> &str;

    async fn fetch_tick(&mut self) -> Result<Tick, SourceError>;
}

/// Output of one processed tick, ready for a terminal-aware caller to print.
#[derive(Clone, Debug, Default)]
pub struct TickReport {
    /// Rendered lifetime-tracker line for the tick's bucket. `None` on the
    /// baseline tick that only establishes the previous metric value.
    pub level: Option<String>,
    /// Breach emitted by the alert watch this tick, if any.
    pub alert: Option<AlertEvent>,
    /// Session profile summary, present every `session_ticks` ticks.
    pub summary: Option<String>,
}

/// Windowed-delta engine for one market: feeds each tick's delta into the
/// bucket registry (lifetime + session views) and the alert watch, and
/// renders the results.
pub struct DeltaEngine {
    config: TrackerConfig,
    market: String,
    style: Style,
    registry: BucketRegistry,
    alert: AlertWatch,
    previous_oi: Option<f64>,
    ticks: u64,
    session_reference: Option<f64>,
    session_min: f64,
    session_max: f64,
}

impl DeltaEngine {
    /// Validates `config` before anything else; configuration errors are
    /// fatal here and never surface mid-run.
    pub fn new(
        config: TrackerConfig,
        market: impl Into<String>,
        sink: Arc<dyn NotificationSink>,
        scheduler: Scheduler,
        colors: bool,
    ) -> Result<Self, OiDeltaError> {
        config.validate()?;
        let market = market.into();
        let style = if colors {
            Style::new(config.bucket_step, config.display_threshold)
        } else {
            Style::plain(config.bucket_step, config.display_threshold)
        };
        let registry = BucketRegistry::new(
            config.bucket_step,
            config.window_durations(),
            config.tick_interval(),
            scheduler.clone(),
        );
        let alert = AlertWatch::new(market.clone(), &config, scheduler, sink);
        Ok(Self {
            config,
            market,
            style,
            registry,
            alert,
            previous_oi: None,
            ticks: 0,
            session_reference: None,
            session_min: f64::MAX,
            session_max: f64::MIN,
        })
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn registry(&self) -> &BucketRegistry {
        &self.registry
    }

    pub fn alert(&self) -> &AlertWatch {
        &self.alert
    }

    /// Process one ticker observation. The first tick only records the
    /// baseline metric value; every later tick feeds `oi - previous_oi`
    /// through the registry and the alert watch.
    pub async fn on_tick(&mut self, tick: Tick) -> TickReport {
        let Some(previous) = self.previous_oi.replace(tick.open_interest) else {
            tracing::debug!(oi = tick.open_interest, "baseline open interest recorded");
            self.session_reference = Some(tick.price);
            self.session_min = tick.price;
            self.session_max = tick.price;
            return TickReport::default();
        };
        let delta = tick.open_interest - previous;

        self.session_min = self.session_min.min(tick.price);
        self.session_max = self.session_max.max(tick.price);

        let (lifetime, _session) = self.registry.observe(tick.price, delta);
        let alert = self.alert.observe(delta, tick.price).await;

        let level = format!(
            "{}        OI: {:>16}",
            lifetime.snapshot(&SnapshotFields::full(), &self.style),
            group_thousands(tick.open_interest, 0, false)
        );

        self.ticks += 1;
        let summary = if self.ticks % self.config.session_ticks == 0 {
            Some(self.render_session_summary(tick.price))
        } else {
            None
        };

        TickReport {
            level: Some(level),
            alert,
            summary,
        }
    }

    /// Render the outgoing session profile (buckets descending), rotate the
    /// session view, and reset the session price references.
    fn render_session_summary(&mut self, price: f64) -> String {
        let session_duration =
            Duration::from_secs_f64(self.config.tick_interval_secs * self.config.session_ticks as f64);
        let outgoing = self.registry.rotate_session();

        let header = format!(
            "profile for {}, last {:.0} minutes:",
            self.market,
            session_duration.as_secs_f64() / 60.0
        );
        let rows = outgoing
            .values()
            .rev()
            .map(|tracker| format!("  {}", tracker.snapshot(&SnapshotFields::profile(), &self.style)))
            .join("\n");
        let total_delta: f64 = outgoing
            .values()
            .map(|tracker| tracker.lifetime_value())
            .sum();

        let reference = self.session_reference.unwrap_or(price);
        let footer = format!(
            "    ticker: {} ({})  min/max: {:.1}/{:.1} (<> {})  oi: {}",
            price,
            self.style.value_with(
                price - reference,
                Duration::from_secs(1),
                ValueFormat {
                    threshold: Some(50.0),
                    pad: 4,
                    decimals: 1,
                    plus: true,
                }
            ),
            self.session_min,
            self.session_max,
            self.style.value_with(
                self.session_max - self.session_min,
                Duration::from_secs(1),
                ValueFormat {
                    threshold: Some(100.0),
                    pad: 4,
                    decimals: 1,
                    plus: false,
                }
            ),
            self.style.value(total_delta, session_duration),
        );

        self.session_reference = Some(price);
        self.session_min = price;
        self.session_max = price;

        format!("{header}\n{rows}\n\n{footer}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alert::Phase, error::NotifyError, registry::bucket_index};
    use parking_lot::Mutex;

    struct RecordingSink(Mutex<Vec<String>>);

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }

        fn count(&self) -> usize {
            self.0.lock().len()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, text: &str) -> Result<(), NotifyError> {
            self.0.lock().push(text.to_string());
            Ok(())
        }
    }

    fn scenario_config() -> TrackerConfig {
        TrackerConfig {
            tick_interval_secs: 5.0,
            short_window_secs: 30.0,
            long_window_secs: 150.0,
            alert_lookback_secs: 30.0,
            alert_threshold: 5_000.0,
            session_ticks: 180,
            ..TrackerConfig::default()
        }
    }

    async fn engine(config: TrackerConfig, sink: Arc<RecordingSink>) -> DeltaEngine {
        DeltaEngine::new(config, "test:PERP", sink, Scheduler::spawn(), false).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_is_fatal_at_construction() {
        let config = TrackerConfig {
            bucket_step: -1.0,
            ..TrackerConfig::default()
        };
        let result = DeltaEngine::new(
            config,
            "test:PERP",
            RecordingSink::new(),
            Scheduler::spawn(),
            false,
        );
        assert!(matches!(result, Err(OiDeltaError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_baseline_tick_produces_no_output() {
        let sink = RecordingSink::new();
        let mut engine = engine(scenario_config(), sink).await;

        let report = engine.on_tick(Tick::new(1_000_000.0, 10_000.0)).await;
        assert!(report.level.is_none());
        assert!(report.alert.is_none());
        assert!(report.summary.is_none());
        assert_eq!(engine.registry().lifetime_buckets(), 0);
    }

    /// Windows {30s, 150s, lifetime}, alert lookback 30s, threshold 5000,
    /// tick 5s, deltas [1000, 2000, 2500, -500, 6000]. Every delta lands
    /// within the 30s window, so after the fifth delta both the short window
    /// and the lifetime view hold the full 11000. Evaluating the alert on
    /// every tick means the first breach fires at the third delta (running
    /// sum 5500); the watch then resets and cools down, suppressing the rest.
    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_delta_scenario() {
        let sink = RecordingSink::new();
        let mut engine = engine(scenario_config(), sink.clone()).await;
        let price = 10_000.0;

        engine.on_tick(Tick::new(100_000.0, price)).await;

        let mut oi = 100_000.0;
        let mut breaches = Vec::new();
        for delta in [1_000.0, 2_000.0, 2_500.0, -500.0, 6_000.0] {
            tokio::time::sleep(Duration::from_secs(5)).await;
            oi += delta;
            let report = engine.on_tick(Tick::new(oi, price)).await;
            assert!(report.level.is_some());
            if let Some(alert) = report.alert {
                breaches.push(alert);
            }
        }

        let (lifetime, _) = engine.registry().observe(price, 0.0);
        assert_eq!(lifetime.window(Duration::from_secs(30)).unwrap().value(), 11_000.0);
        assert_eq!(lifetime.window(Duration::from_secs(150)).unwrap().value(), 11_000.0);
        assert_eq!(lifetime.lifetime_value(), 11_000.0);
        assert_eq!(lifetime.ticks(), 6);

        assert_eq!(breaches.len(), 1);
        assert_eq!(breaches[0].value, 5_500.0);
        assert_eq!(sink.count(), 1);
        assert_eq!(engine.alert().phase(), Phase::Cooldown);
    }

    /// Same scenario with a threshold only the final running sum crosses:
    /// the breach fires on the fifth delta carrying the full 11000.
    #[tokio::test(start_paused = true)]
    async fn test_breach_on_final_delta_carries_full_window() {
        let sink = RecordingSink::new();
        let config = TrackerConfig {
            alert_threshold: 10_000.0,
            ..scenario_config()
        };
        let mut engine = engine(config, sink.clone()).await;

        engine.on_tick(Tick::new(100_000.0, 10_000.0)).await;
        let mut oi = 100_000.0;
        let mut last_alert = None;
        for delta in [1_000.0, 2_000.0, 2_500.0, -500.0, 6_000.0] {
            tokio::time::sleep(Duration::from_secs(5)).await;
            oi += delta;
            let report = engine.on_tick(Tick::new(oi, 10_000.0)).await;
            if report.alert.is_some() {
                last_alert = report.alert;
            }
        }

        let alert = last_alert.unwrap();
        assert_eq!(alert.value, 11_000.0);
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deltas_fan_into_price_buckets() {
        let sink = RecordingSink::new();
        let mut engine = engine(scenario_config(), sink).await;

        engine.on_tick(Tick::new(100_000.0, 10_234.5)).await;
        engine.on_tick(Tick::new(101_000.0, 10_234.5)).await;
        engine.on_tick(Tick::new(101_500.0, 10_239.9)).await;
        engine.on_tick(Tick::new(101_400.0, 10_240.1)).await;

        // 10234.5 and 10239.9 share bucket 10230; 10240.1 starts 10240.
        assert_eq!(engine.registry().lifetime_buckets(), 2);
        let (lower, _) = engine.registry().observe(10_230.0, 0.0);
        assert_eq!(lower.lifetime_value(), 1_500.0);
        let (upper, _) = engine.registry().observe(10_240.0, 0.0);
        assert_eq!(upper.lifetime_value(), -100.0);
        assert_eq!(
            bucket_index(10_239.9, 10.0),
            bucket_index(10_234.5, 10.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_summary_every_session_ticks() {
        let sink = RecordingSink::new();
        let config = TrackerConfig {
            session_ticks: 3,
            ..scenario_config()
        };
        let mut engine = engine(config, sink).await;

        engine.on_tick(Tick::new(100_000.0, 10_000.0)).await;
        let mut oi = 100_000.0;
        let mut summaries = Vec::new();
        for (delta, price) in [
            (1_000.0, 10_000.0),
            (500.0, 10_012.0),
            (-200.0, 10_025.0),
            (300.0, 10_025.0),
        ] {
            tokio::time::sleep(Duration::from_secs(5)).await;
            oi += delta;
            let report = engine.on_tick(Tick::new(oi, price)).await;
            if let Some(summary) = report.summary {
                summaries.push(summary);
            }
        }

        // Rotation hit exactly once, on the third delta.
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert!(summary.contains("profile for test:PERP"));
        assert!(summary.contains("10,000"));
        assert!(summary.contains("10,020"));
        assert!(summary.contains("min/max: 10000.0/10025.0"));

        // The rotation cleared the session view but not the lifetime view.
        assert_eq!(engine.registry().session_buckets(), 1);
        assert_eq!(engine.registry().lifetime_buckets(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_level_line_shows_raw_open_interest() {
        let sink = RecordingSink::new();
        let mut engine = engine(scenario_config(), sink).await;

        engine.on_tick(Tick::new(1_234_000.0, 10_000.0)).await;
        let report = engine.on_tick(Tick::new(1_234_567.0, 10_000.0)).await;
        let line = report.level.unwrap();
        assert!(line.contains("OI:"));
        assert!(line.contains("1,234,567"));
        assert!(line.contains("last:"));
        assert!(line.contains("567"));
    }
}
