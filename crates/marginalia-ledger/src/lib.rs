//! Marginalia Sync Ledger
//!
//! Durable record of which source-side annotations have already been written
//! to a destination document, and under which destination block id.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         LEDGER                               │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │   (scope_id, logical_id) ──lookup_by_logical──► block id     │
//! │   (scope_id, block id)   ──lookup_by_materialized──► logical │
//! │                                                              │
//! │   ┌──────────────┐   replay    ┌────────────────────────┐    │
//! │   │  ledger log  │───────────► │  in-memory scope index │    │
//! │   │ (bincode,    │ ◄───────────│                        │    │
//! │   │  fsync'd)    │   append    └────────────────────────┘    │
//! │   └──────────────┘                                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Idempotent inserts**: the key is the full triple
//!   `(scope_id, logical_id, materialized_id)`; inserting a present triple is a
//!   silent no-op and never overwrites an earlier mapping.
//! - **Durable before acknowledged**: every mutation is appended to the log and
//!   flushed with `sync_data` before the call returns `Ok`.
//! - **Scoped**: ids never collide across scopes (destination documents).

mod file;
mod log;


pub use file::FileLedger;
pub use log::LedgerRecord;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Types
// ============================================================================

/// One materialization: a logical annotation written as a destination block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Destination document (or collection) the entry is confined to
    pub scope_id: String,
    /// Stable source-side id of the annotation, chapter or section
    pub logical_id: String,
    /// Destination-assigned block id
    pub materialized_id: String,
    /// When the block was first recorded
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger record encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("corrupt ledger record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
}

// ============================================================================
// Ledger Interface
// ============================================================================

/// The engine's only source of truth for "has this already been written".
///
/// Implementations must persist every mutation before returning `Ok`; an
/// in-memory-only acknowledgement would turn into duplicate writes on the next
/// pass.
pub trait Ledger {
    /// Record a materialization. Present triples are ignored.
    fn insert(
        &self,
        scope_id: &str,
        logical_id: &str,
        materialized_id: &str,
    ) -> Result<(), LedgerError>;

    /// First-recorded block id for `logical_id`.
    fn lookup_by_logical(
        &self,
        scope_id: &str,
        logical_id: &str,
    ) -> Result<Option<String>, LedgerError>;

    /// First-recorded logical id that produced `materialized_id`.
    fn lookup_by_materialized(
        &self,
        scope_id: &str,
        materialized_id: &str,
    ) -> Result<Option<String>, LedgerError>;

    /// Forget every entry of a scope (document recreated from scratch).
    fn delete_scope(&self, scope_id: &str) -> Result<(), LedgerError>;

    /// Forget every block recorded for one logical id (retirement).
    fn delete_entry(&self, scope_id: &str, logical_id: &str) -> Result<(), LedgerError>;

    /// All live entries of a scope, in insertion order.
    fn entries(&self, scope_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;
}
