//! Marginalia Sync: idempotent mirroring of reading notes into block documents
//!
//! Chapters, highlights, reviews and reading statistics of a book are written
//! to a destination page made of an ordered list of blocks. Each pass only
//! writes what the ledger has not seen yet, and places it next to the content
//! of earlier passes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          ONE BOOK PASS                               │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  ┌────────────┐   chapters    ┌──────────────┐                       │
//! │  │ Annotation │──────────────►│ ChapterTree  │ build/attach/prune    │
//! │  │  Source    │  annotations  └──────┬───────┘                       │
//! │  └────────────┘                      │                               │
//! │                                      ▼                               │
//! │  ┌────────────┐  blocks  ┌───────────────┐   ┌────────────────┐      │
//! │  │Destination │─────────►│ BlockSequence │──►│ BlockCompiler  │      │
//! │  │   page     │          │ (find_anchor) │   │ requests with  │      │
//! │  └─────▲──────┘          └───────▲───────┘   │ fixed anchors  │      │
//! │        │                         │ resolve   └───────┬────────┘      │
//! │        │ append_after     ┌──────┴──────┐            │               │
//! │        └──────────────────│BatchDispatch│◄───────────┘               │
//! │                           └──────┬──────┘                            │
//! │                                  │ insert                            │
//! │                           ┌──────▼──────┐                            │
//! │                           │   Ledger    │                            │
//! │                           └─────────────┘                            │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure model
//! - A pass is sequential for its book; books are isolated from each other.
//! - Every write is recorded right after it lands, so an aborted pass is
//!   safely retried: recorded blocks are skipped, the rest is written again.
//! - A book's sort marker is committed only after its pass flushed, so a
//!   failed book is retried by the next run.
//! - A destination returning the wrong number of ids aborts the pass instead
//!   of guessing a mapping.

pub mod compile;
pub mod config;
pub mod destination;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod link;
pub mod local;
pub mod model;
pub mod position;
pub mod source;
pub mod sync;
pub mod throttle;
pub mod tree;

pub use compile::{BlockCompiler, BookContent, CompiledPass, Retirement};
pub use config::{ConfigError, ContentStyle, FormatConfig, SyncConfig};
pub use destination::{Destination, PageHandle, PageProperties};
pub use dispatch::{AppendedBatch, BatchDispatcher, FlushReport};
pub use error::{SyncError, TransportError};
pub use format::{BlockFormatter, NotionBlocks};
pub use local::{ExportSource, LocalDocumentStore};
pub use model::{
    Annotation, AnnotationKind, BlockKind, BlockPayload, Book, BookInfo, Chapter, ChapterId,
    DailyReading, ExistingBlock, InsertionRequest, ReadingStats, ReadingStatus, ReviewItem,
};
pub use position::{BlockSequence, ResolvedBlock};
pub use source::{AnnotationSource, BookReviews};
pub use sync::{BookFailure, BookReport, SyncEvent, SyncEventHandler, SyncManager, SyncSummary};
pub use throttle::{Cooldown, Throttled};
pub use tree::{ChapterNode, ChapterTree};

pub use marginalia_ledger::{FileLedger, Ledger, LedgerEntry, LedgerError};
