//! Error taxonomy for the tracker.

use thiserror::Error;

/// Failure of a single provider call.
///
/// Transport and data-shape failures are retried the same way (next scheduled
/// cycle) but are kept apart so logs can tell them apart.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Network unreachable, timeout or non-success HTTP status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response parsed but a required value was missing, non-finite or non-positive.
    #[error("unexpected response shape: {0}")]
    DataShape(String),

    /// Local usage counter says the provider's quota is spent; no request was sent.
    #[error("API quota exhausted for {provider} ({used}/{limit})")]
    QuotaExceeded { provider: String, used: i64, limit: i64 },
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::DataShape(_) => "data_shape",
            FetchError::QuotaExceeded { .. } => "quota",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        // Timeouts, connection failures and undecodable bodies alike.
        FetchError::Transport(e.to_string())
    }
}

/// Top-level error surfaced by the oracle and the host.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("data shape error: {0}")]
    DataShape(String),

    #[error("no exchange rate available for {currency}")]
    RateUnavailable { currency: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("API quota exhausted for {provider} ({used}/{limit})")]
    QuotaExceeded { provider: String, used: i64, limit: i64 },

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<FetchError> for TrackerError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Transport(msg) => TrackerError::Transport(msg),
            FetchError::DataShape(msg) => TrackerError::DataShape(msg),
            FetchError::QuotaExceeded { provider, used, limit } => {
                TrackerError::QuotaExceeded { provider, used, limit }
            }
        }
    }
}

impl From<sqlx::Error> for TrackerError {
    fn from(e: sqlx::Error) -> Self {
        TrackerError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(e: serde_json::Error) -> Self {
        TrackerError::Persistence(e.to_string())
    }
}

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;
