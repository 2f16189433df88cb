//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed delimited text in the address store.
    #[error("Store format error: {0}")]
    Csv(#[from] csv::Error),

    /// A store row could not be turned into a record.
    #[error("Parse error on line {line}: {reason}")]
    Parse {
        /// 1-based line of the offending row.
        line: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No backend understands the account's source URI.
    #[error("Unsupported mail source: {0}")]
    UnsupportedSource(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
