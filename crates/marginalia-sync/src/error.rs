//! Error types for the sync engine

use marginalia_ledger::LedgerError;
use thiserror::Error;

/// Failure talking to the annotation source or the destination.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Reasons a book pass aborts.
///
/// Malformed chapter data is not in here: it is logged and degraded while the
/// tree is built.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("destination returned {actual} block ids for {expected} submitted blocks")]
    BatchMismatch { expected: usize, actual: usize },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("invalid source data: {0}")]
    InvalidSource(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
