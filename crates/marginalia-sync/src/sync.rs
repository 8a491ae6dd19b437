//! Sync Manager: runs sync passes book by book
//!
//! A pass over one book:
//! 1. Fetch chapters, annotations, reviews and statistics from the source
//! 2. Find or create the book's page and refresh its properties (a new page
//!    wipes the book's ledger scope)
//! 3. Resolve the page's current blocks through the ledger
//! 4. Compile insertion requests and retirements
//! 5. Retire stale aggregate blocks, then flush the requests
//! 6. Commit the book's sort marker on the page
//!
//! A book is skipped when its sort marker is not newer than the one its page
//! committed. The marker is committed last, so a book whose pass failed is
//! picked up again by the next run.

use crate::compile::{BlockCompiler, BookContent};
use crate::config::SyncConfig;
use crate::destination::{Destination, PageProperties};
use crate::dispatch::{BatchDispatcher, FlushReport};
use crate::error::{Result, SyncError, TransportError};
use crate::format::{BlockFormatter, NotionBlocks};
use crate::model::Book;
use crate::position::BlockSequence;
use crate::source::AnnotationSource;
use marginalia_ledger::Ledger;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Sync Events for Observability
// ============================================================================

/// Events emitted during sync passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEvent {
    BookStarted {
        book_id: String,
        title: String,
    },
    /// Nothing changed at the source since the last sync
    BookSkipped {
        book_id: String,
        sort: i64,
        synced_sort: i64,
    },
    BookCompiled {
        book_id: String,
        requests: usize,
        retirements: usize,
        orphans: usize,
    },
    BatchAppended {
        book_id: String,
        after: Option<String>,
        count: usize,
    },
    BookSynced {
        book_id: String,
        recorded: usize,
    },
    BookFailed {
        book_id: String,
        message: String,
    },
}

/// Callback for sync events
pub type SyncEventHandler = Box<dyn Fn(SyncEvent) + Send + Sync>;

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookReport {
    pub book_id: String,
    pub page_id: String,
    pub created_page: bool,
    pub requests: usize,
    pub retired: usize,
    pub orphans: usize,
    pub pruned_chapters: usize,
    pub append_calls: usize,
    pub blocks_created: usize,
    /// Requests recorded in the ledger
    pub recorded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookFailure {
    pub book_id: String,
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub synced: Vec<BookReport>,
    pub skipped: Vec<String>,
    pub failed: Vec<BookFailure>,
}

impl SyncSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// Sync Manager
// ============================================================================

pub struct SyncManager {
    source: Arc<dyn AnnotationSource>,
    destination: Arc<dyn Destination>,
    ledger: Arc<dyn Ledger>,
    formatter: Box<dyn BlockFormatter>,
    config: SyncConfig,
    event_handlers: Vec<SyncEventHandler>,
}

impl SyncManager {
    pub fn new(
        source: Arc<dyn AnnotationSource>,
        destination: Arc<dyn Destination>,
        ledger: Arc<dyn Ledger>,
        config: SyncConfig,
    ) -> Self {
        let formatter = Box::new(NotionBlocks::new(&config.format));
        Self {
            source,
            destination,
            ledger,
            formatter,
            config,
            event_handlers: Vec::new(),
        }
    }

    /// Replace the default Notion formatter.
    pub fn with_formatter(mut self, formatter: Box<dyn BlockFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Add an event handler
    pub fn on_event(&mut self, handler: SyncEventHandler) {
        self.event_handlers.push(handler);
    }

    fn emit(&self, event: SyncEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Sync every book whose notes changed since the last run.
    ///
    /// A failing book is logged and reported; the remaining books still sync.
    /// Only failures to list books or read the committed sort markers abort
    /// the whole run.
    pub fn sync_all(&self) -> Result<SyncSummary> {
        let synced_sorts = self.destination.synced_sorts()?;
        let books = self.source.list_books()?;
        tracing::info!(books = books.len(), synced = synced_sorts.len(), "starting sync");

        let mut summary = SyncSummary::default();
        for book in books {
            let unchanged = synced_sorts
                .get(&book.book_id)
                .copied()
                .filter(|synced| !self.config.force && book.sort <= *synced);
            if let Some(synced_sort) = unchanged {
                tracing::debug!(
                    book_id = %book.book_id,
                    sort = book.sort,
                    synced_sort,
                    "no new notes, skipping"
                );
                self.emit(SyncEvent::BookSkipped {
                    book_id: book.book_id.clone(),
                    sort: book.sort,
                    synced_sort,
                });
                summary.skipped.push(book.book_id);
                continue;
            }

            match self.sync_book(&book) {
                Ok(report) => summary.synced.push(report),
                Err(err) => {
                    tracing::error!(
                        book_id = %book.book_id,
                        title = %book.title,
                        error = %err,
                        "book sync failed"
                    );
                    self.emit(SyncEvent::BookFailed {
                        book_id: book.book_id.clone(),
                        message: err.to_string(),
                    });
                    summary.failed.push(BookFailure {
                        book_id: book.book_id,
                        title: book.title,
                        error: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            synced = summary.synced.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "sync finished"
        );
        Ok(summary)
    }

    /// Run one pass over `book`.
    pub fn sync_book(&self, book: &Book) -> Result<BookReport> {
        if book.book_id.trim().is_empty() {
            return Err(SyncError::InvalidSource(format!(
                "book {:?} has no id",
                book.title
            )));
        }
        let scope_id = book.book_id.as_str();
        tracing::info!(book_id = scope_id, title = %book.title, "syncing book");
        self.emit(SyncEvent::BookStarted {
            book_id: book.book_id.clone(),
            title: book.title.clone(),
        });

        let content = self.fetch(scope_id)?;
        let info = self.source.book_info(scope_id)?;

        let page = self
            .destination
            .ensure_page(&PageProperties::new(book, &info))?;
        let sequence = if page.created {
            // Anything recorded belongs to a page that no longer exists
            self.ledger.delete_scope(scope_id)?;
            BlockSequence::default()
        } else {
            let blocks = self.destination.list_existing_blocks(&page.page_id)?;
            BlockSequence::resolve(scope_id, blocks, self.ledger.as_ref())?
        };

        let compiler =
            BlockCompiler::new(self.formatter.as_ref(), self.ledger.as_ref(), &self.config);
        let compiled = compiler.compile(scope_id, &content, &sequence)?;
        if !compiled.orphans.is_empty() {
            tracing::warn!(
                book_id = scope_id,
                count = compiled.orphans.len(),
                "annotations without a chapter were not written"
            );
        }
        self.emit(SyncEvent::BookCompiled {
            book_id: book.book_id.clone(),
            requests: compiled.requests.len(),
            retirements: compiled.retirements.len(),
            orphans: compiled.orphans.len(),
        });

        for retirement in &compiled.retirements {
            match self.destination.delete_block(&retirement.materialized_id) {
                Ok(()) => {}
                Err(TransportError::NotFound(_)) => tracing::warn!(
                    book_id = scope_id,
                    block_id = %retirement.materialized_id,
                    "retired block already gone"
                ),
                Err(err) => return Err(err.into()),
            }
            self.ledger.delete_entry(scope_id, &retirement.logical_id)?;
        }

        let flush = BatchDispatcher::new(
            self.destination.as_ref(),
            self.ledger.as_ref(),
            self.config.max_batch,
        )
        .flush(&page.page_id, scope_id, &compiled.requests)?;
        self.emit_batches(scope_id, &flush);
        self.destination.commit_sort(&page.page_id, book.sort)?;

        let report = BookReport {
            book_id: book.book_id.clone(),
            page_id: page.page_id,
            created_page: page.created,
            requests: compiled.requests.len(),
            retired: compiled.retirements.len(),
            orphans: compiled.orphans.len(),
            pruned_chapters: compiled.pruned_chapters,
            append_calls: flush.append_calls,
            blocks_created: flush.blocks_created,
            recorded: flush.materialized.len(),
        };
        tracing::info!(
            book_id = scope_id,
            recorded = report.recorded,
            append_calls = report.append_calls,
            "book synced"
        );
        self.emit(SyncEvent::BookSynced {
            book_id: book.book_id.clone(),
            recorded: report.recorded,
        });
        Ok(report)
    }

    fn fetch(&self, book_id: &str) -> Result<BookContent> {
        let chapters = self.source.list_chapters(book_id)?;
        let mut annotations = self.source.list_annotations(book_id)?;
        let reviews = self.source.list_reviews(book_id)?;
        let stats = self.source.reading_stats(book_id)?;

        annotations.extend(reviews.chapter_reviews);
        annotations.sort_by_key(|a| a.order_key());

        Ok(BookContent {
            chapters,
            annotations,
            summary: reviews.summary,
            stats,
        })
    }

    fn emit_batches(&self, book_id: &str, flush: &FlushReport) {
        if self.event_handlers.is_empty() {
            return;
        }
        for batch in &flush.batches {
            self.emit(SyncEvent::BatchAppended {
                book_id: book_id.to_string(),
                after: batch.after.clone(),
                count: batch.count,
            });
        }
    }
}
