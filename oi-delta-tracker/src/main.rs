//! Console open-interest delta tracker.
//!
//! Polls the configured exchange ticker at a fixed cadence, feeds the
//! tick-to-tick open-interest delta into the windowed accumulator engine,
//! prints per-bucket level lines and periodic session profiles, and forwards
//! threshold alerts to Telegram.

mod exchange;
mod telegram;

use oi_delta::{DeltaEngine, Scheduler, TrackerConfig, render};
use std::{io::IsTerminal, sync::Arc};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    load_env_file();
    init_logging();

    let config = config_from_env();
    let mut source = match exchange::from_env() {
        Ok(source) => source,
        Err(err) => {
            error!(%err, "exchange configuration error");
            std::process::exit(1);
        }
    };

    let telegram = Arc::new(telegram::Telegram::from_env());
    if let Err(err) = telegram.check_conn().await {
        warn!(%err, "telegram connectivity check failed; alerts may not deliver");
    }

    let colors = std::io::stdout().is_terminal() && std::env::var("NOCOLOR").is_err();
    let scheduler = Scheduler::spawn();
    let mut engine = match DeltaEngine::new(config.clone(), source.label(), telegram, scheduler, colors)
    {
        Ok(engine) => engine,
        Err(err) => {
            error!(%err, "invalid configuration");
            std::process::exit(1);
        }
    };

    info!(market = engine.market(), interval_secs = config.tick_interval_secs, "tracker starting");
    println!(
        "{}",
        render::timestamped(&format!("tracking OI levels for {}", engine.market()))
    );

    let mut timer = tokio::time::interval(config.tick_interval());
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                println!("\nbye");
                break;
            }
            _ = timer.tick() => {
                match source.fetch_tick().await {
                    Ok(tick) => {
                        let report = engine.on_tick(tick).await;
                        if let Some(level) = &report.level {
                            println!("{}", render::timestamped(level));
                        }
                        if let Some(alert) = &report.alert {
                            println!("{}", render::timestamped("alert reached"));
                            println!("{}\n", alert.render());
                        }
                        if let Some(summary) = &report.summary {
                            println!("\n{summary}\n");
                        }
                    }
                    // A bad tick never terminates the loop; state is retained
                    // and the next interval proceeds as usual.
                    Err(err) => warn!(%err, "ticker poll failed; skipping tick"),
                }
            }
        }
    }
}

/// Resolve on the first Ctrl-C or SIGTERM, whichever arrives.
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            warn!(%err, "SIGTERM handler unavailable; shutting down on Ctrl-C only");
            tokio::signal::ctrl_c().await.ok();
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

/// Load an env file before anything reads the environment: an explicit
/// `ENV_FILE` path first, falling back to `./env` then `./.env`.
fn load_env_file() {
    match std::env::var("ENV_FILE") {
        Ok(path) => {
            if dotenv::from_filename(&path).is_err() {
                eprintln!("no environment file (looking for \"{path}\")");
            }
        }
        Err(_) => {
            if dotenv::from_filename("env").is_err() {
                dotenv::dotenv().ok();
            }
        }
    }
}

/// Initialize logging
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Assemble the tracker configuration from the environment, falling back to
/// the built-in defaults knob by knob. Validation happens at engine
/// construction.
fn config_from_env() -> TrackerConfig {
    let defaults = TrackerConfig::default();
    TrackerConfig {
        tick_interval_secs: env_parse("INTERVAL", defaults.tick_interval_secs),
        display_threshold: env_parse("THRESHOLD", defaults.display_threshold),
        short_window_secs: env_parse("D1", defaults.short_window_secs),
        long_window_secs: env_parse("D2", defaults.long_window_secs),
        bucket_step: env_parse("PRICE_STEP", defaults.bucket_step),
        session_ticks: env_parse("PROFILE_TICKS", defaults.session_ticks),
        alert_lookback_secs: env_parse("ALERT_INTERVAL", defaults.alert_lookback_secs),
        alert_threshold: env_parse("ALERT_THRESHOLD", defaults.alert_threshold),
        alert_cooldown_secs: env_parse("ALERT_COOLDOWN", defaults.alert_cooldown_secs),
    }
}
