//! Destination document collaborator
//!
//! The destination is a set of pages, each an ordered list of top-level
//! blocks that may carry children. New blocks can only be appended after an
//! existing top-level block or at the end of the page.

use crate::error::TransportError;
use crate::format::{day, reading_time};
use crate::link::reader_url;
use crate::model::{BlockPayload, Book, BookInfo, ExistingBlock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHandle {
    pub page_id: String,
    /// The page did not exist before this call
    pub created: bool,
}

/// Properties written on a book's page every pass, display-ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageProperties {
    pub book_id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub isbn: String,
    /// Web reader link
    #[serde(default)]
    pub url: String,
    /// Public rating, per mille
    #[serde(default)]
    pub rating: Option<u32>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub note_count: u32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reading_time: Option<String>,
    #[serde(default)]
    pub last_read: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

impl PageProperties {
    pub fn new(book: &Book, info: &BookInfo) -> Self {
        let opened = info.status.is_some();
        Self {
            book_id: book.book_id.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            cover: book.cover.clone(),
            isbn: info.isbn.clone(),
            url: reader_url(&book.book_id),
            rating: info.rating,
            category: info.category.clone(),
            note_count: book.note_count,
            status: info.status.map(|s| s.label().to_string()),
            reading_time: opened.then(|| reading_time(info.reading_seconds)),
            last_read: info.last_read.map(day),
            finished_at: info.finished_at.map(day),
        }
    }
}

pub trait Destination {
    /// Find the page of a book, creating it as needed, and write its
    /// properties.
    fn ensure_page(&self, properties: &PageProperties) -> Result<PageHandle, TransportError>;

    /// Sort marker of the last completed pass, keyed by book id.
    fn synced_sorts(&self) -> Result<HashMap<String, i64>, TransportError>;

    /// Record that the page now holds the book's notes as of `sort`.
    /// Called only once a pass has flushed everything for the book.
    fn commit_sort(&self, page_id: &str, sort: i64) -> Result<(), TransportError>;

    /// Top-level blocks of a page, in document order.
    fn list_existing_blocks(&self, page_id: &str) -> Result<Vec<ExistingBlock>, TransportError>;

    /// Insert `payloads` after `anchor` (at the end of the page when `None`)
    /// and return the created block ids in submission order.
    fn append_after(
        &self,
        page_id: &str,
        anchor: Option<&str>,
        payloads: &[BlockPayload],
    ) -> Result<Vec<String>, TransportError>;

    /// Append `payloads` as children of `block_id`.
    fn append_children(
        &self,
        block_id: &str,
        payloads: &[BlockPayload],
    ) -> Result<Vec<String>, TransportError>;

    fn delete_block(&self, block_id: &str) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReadingStatus;

    fn dune() -> Book {
        Book {
            book_id: "695233".to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            cover: Some("cover.jpg".to_string()),
            sort: 3,
            note_count: 12,
        }
    }

    #[test]
    fn test_properties_of_a_finished_book() {
        let info = BookInfo {
            isbn: "9780441013593".to_string(),
            rating: Some(874),
            category: "Fiction".to_string(),
            status: Some(ReadingStatus::from_marked_status(4)),
            reading_seconds: 3900,
            last_read: Some(1_700_000_000),
            finished_at: Some(0),
        };
        let props = PageProperties::new(&dune(), &info);

        assert_eq!(
            props.url,
            "https://weread.qq.com/web/reader/ce032b305a9bc1ce0b0dd2a"
        );
        assert_eq!(props.rating, Some(874));
        assert_eq!(props.note_count, 12);
        assert_eq!(props.status.as_deref(), Some("Finished"));
        assert_eq!(props.reading_time.as_deref(), Some("1 hr 5 min"));
        assert_eq!(props.last_read.as_deref(), Some("2023/11/14"));
        assert_eq!(props.finished_at.as_deref(), Some("1970/01/01"));
    }

    #[test]
    fn test_unopened_book_has_no_progress() {
        let props = PageProperties::new(&dune(), &BookInfo::default());
        assert_eq!(props.title, "Dune");
        assert!(props.url.ends_with("ce032b305a9bc1ce0b0dd2a"));
        assert_eq!(props.status, None);
        assert_eq!(props.reading_time, None);
        assert_eq!(props.rating, None);
    }
}
