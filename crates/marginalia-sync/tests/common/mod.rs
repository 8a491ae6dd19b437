//! Shared fixtures for marginalia-sync integration tests

#![allow(dead_code)]

use marginalia_sync::local::{ExportFile, ExportedBook};
use marginalia_sync::{
    Annotation, AnnotationKind, BlockPayload, Book, BookInfo, Chapter, ChapterId, Destination,
    ExistingBlock, Ledger, LedgerEntry, LedgerError, LocalDocumentStore, PageHandle,
    PageProperties, TransportError,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Destination Wrapper
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AppendAfter { after: Option<String>, count: usize },
    AppendChildren { parent: String, count: usize },
    Delete { block_id: String },
}

/// How `append_children` misbehaves, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildFault {
    /// Every call is rejected before anything is written
    Reject,
    /// Children are written but the last id is not returned
    Shortchange,
}

/// Records every mutating call and can shortchange one append.
#[derive(Debug)]
pub struct RecordingDestination {
    pub store: LocalDocumentStore,
    calls: Mutex<Vec<Call>>,
    /// 1-based index of the `append_after` call that loses its last id
    short_append: Option<usize>,
    appends: AtomicUsize,
    child_fault: Option<ChildFault>,
}

impl RecordingDestination {
    pub fn new() -> Self {
        Self {
            store: LocalDocumentStore::in_memory(),
            calls: Mutex::new(Vec::new()),
            short_append: None,
            appends: AtomicUsize::new(0),
            child_fault: None,
        }
    }

    pub fn shortchanging(nth_append: usize) -> Self {
        Self {
            short_append: Some(nth_append),
            ..Self::new()
        }
    }

    pub fn with_child_fault(fault: ChildFault) -> Self {
        Self {
            child_fault: Some(fault),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn append_sizes(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AppendAfter { count, .. } => Some(count),
                _ => None,
            })
            .collect()
    }
}

impl Destination for RecordingDestination {
    fn ensure_page(&self, properties: &PageProperties) -> Result<PageHandle, TransportError> {
        self.store.ensure_page(properties)
    }

    fn synced_sorts(&self) -> Result<HashMap<String, i64>, TransportError> {
        self.store.synced_sorts()
    }

    fn commit_sort(&self, page_id: &str, sort: i64) -> Result<(), TransportError> {
        self.store.commit_sort(page_id, sort)
    }

    fn list_existing_blocks(&self, page_id: &str) -> Result<Vec<ExistingBlock>, TransportError> {
        self.store.list_existing_blocks(page_id)
    }

    fn append_after(
        &self,
        page_id: &str,
        anchor: Option<&str>,
        payloads: &[BlockPayload],
    ) -> Result<Vec<String>, TransportError> {
        self.calls.lock().push(Call::AppendAfter {
            after: anchor.map(str::to_string),
            count: payloads.len(),
        });
        let mut ids = self.store.append_after(page_id, anchor, payloads)?;
        let n = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if self.short_append == Some(n) {
            ids.pop();
        }
        Ok(ids)
    }

    fn append_children(
        &self,
        block_id: &str,
        payloads: &[BlockPayload],
    ) -> Result<Vec<String>, TransportError> {
        self.calls.lock().push(Call::AppendChildren {
            parent: block_id.to_string(),
            count: payloads.len(),
        });
        match self.child_fault {
            Some(ChildFault::Reject) => {
                Err(TransportError::Rejected("children rejected".to_string()))
            }
            Some(ChildFault::Shortchange) => {
                let mut ids = self.store.append_children(block_id, payloads)?;
                ids.pop();
                Ok(ids)
            }
            None => self.store.append_children(block_id, payloads),
        }
    }

    fn delete_block(&self, block_id: &str) -> Result<(), TransportError> {
        self.calls.lock().push(Call::Delete {
            block_id: block_id.to_string(),
        });
        self.store.delete_block(block_id)
    }
}

// ============================================================================
// Ledger Wrapper
// ============================================================================

/// A ledger whose storage breaks after `ok_inserts` successful inserts.
pub struct FailingLedger<L> {
    inner: L,
    ok_inserts: usize,
    inserts: AtomicUsize,
}

impl<L: Ledger> FailingLedger<L> {
    pub fn new(inner: L, ok_inserts: usize) -> Self {
        Self {
            inner,
            ok_inserts,
            inserts: AtomicUsize::new(0),
        }
    }
}

impl<L: Ledger> Ledger for FailingLedger<L> {
    fn insert(
        &self,
        scope_id: &str,
        logical_id: &str,
        materialized_id: &str,
    ) -> Result<(), LedgerError> {
        if self.inserts.fetch_add(1, Ordering::SeqCst) >= self.ok_inserts {
            return Err(LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.insert(scope_id, logical_id, materialized_id)
    }

    fn lookup_by_logical(
        &self,
        scope_id: &str,
        logical_id: &str,
    ) -> Result<Option<String>, LedgerError> {
        self.inner.lookup_by_logical(scope_id, logical_id)
    }

    fn lookup_by_materialized(
        &self,
        scope_id: &str,
        materialized_id: &str,
    ) -> Result<Option<String>, LedgerError> {
        self.inner.lookup_by_materialized(scope_id, materialized_id)
    }

    fn delete_scope(&self, scope_id: &str) -> Result<(), LedgerError> {
        self.inner.delete_scope(scope_id)
    }

    fn delete_entry(&self, scope_id: &str, logical_id: &str) -> Result<(), LedgerError> {
        self.inner.delete_entry(scope_id, logical_id)
    }

    fn entries(&self, scope_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.inner.entries(scope_id)
    }
}

// ============================================================================
// Source Data
// ============================================================================

pub fn paragraph(text: &str) -> BlockPayload {
    BlockPayload(json!({
        "type": "paragraph",
        "paragraph": { "rich_text": [{ "type": "text", "text": { "content": text } }] }
    }))
}

pub fn book(id: &str, sort: i64) -> Book {
    Book {
        book_id: id.to_string(),
        title: format!("Book {id}"),
        author: "Anon".to_string(),
        cover: None,
        sort,
        note_count: 0,
    }
}

/// Page properties of `book` with no extra metadata.
pub fn properties(book: &Book) -> PageProperties {
    PageProperties::new(book, &BookInfo::default())
}

pub fn chapter(id: ChapterId, level: i32) -> Chapter {
    Chapter {
        chapter_id: id,
        level,
        title: format!("Chapter {id}"),
    }
}

pub fn highlight(id: &str, chapter: ChapterId, range_start: u64) -> Annotation {
    Annotation {
        logical_id: id.to_string(),
        chapter_id: Some(chapter),
        kind: AnnotationKind::Highlight,
        text: format!("mark {id}"),
        style: Some(1),
        color: Some(4),
        range_start,
        note: None,
    }
}

pub fn exported(book: Book, chapters: Vec<Chapter>, annotations: Vec<Annotation>) -> ExportedBook {
    ExportedBook {
        book,
        chapters,
        annotations,
        summary: Vec::new(),
        chapter_reviews: Vec::new(),
        stats: None,
        info: BookInfo::default(),
    }
}

pub fn export(books: Vec<ExportedBook>) -> ExportFile {
    ExportFile { books }
}

/// Plain text of the top-level blocks of a book's page.
pub fn outline(store: &LocalDocumentStore, book_id: &str) -> Vec<String> {
    store
        .page_for(book_id)
        .map(|page| page.blocks.iter().map(|b| b.payload.plain_text()).collect())
        .unwrap_or_default()
}
