use thiserror::Error;

/// Failures of the sampling/aggregation path. None of these are fatal to the
/// periodic loops; callers log them and move on to the next tick.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("network counters unavailable: {0}")]
    SamplingUnavailable(String),

    #[error("network identity query failed: {0}")]
    QueryUnavailable(String),

    #[error("ledger store {path} is corrupt: {reason}")]
    PersistenceCorrupt { path: String, reason: String },

    #[error("failed to write ledger store {path}: {source}")]
    PersistenceWriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to persist ledger: {0}")]
    InvalidLedger(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
