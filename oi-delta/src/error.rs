use thiserror::Error;

/// All errors generated in `oi-delta`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OiDeltaError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("market data source error: {0}")]
    Source(#[from] SourceError),

    #[error("notification delivery failed: {0}")]
    Notify(#[from] NotifyError),
}

/// Transient failure while fetching ticker data. Recovered locally by
/// skipping the tick and continuing at the next interval.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SourceError(pub String);

/// Failure delivering a notification. Non-fatal: the alert state machine
/// proceeds to cooldown regardless.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);
