//! Fixed cooldown between collaborator calls
//!
//! Both the source and the destination enforce request-rate ceilings. Every
//! call made through [`Throttled`] waits until at least `interval` has passed
//! since the previous call. There is no adaptive backoff.

use crate::destination::{Destination, PageHandle, PageProperties};
use crate::error::TransportError;
use crate::model::{
    Annotation, BlockPayload, Book, BookInfo, Chapter, ExistingBlock, ReadingStats,
};
use crate::source::{AnnotationSource, BookReviews};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Cooldown {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    /// Block until the cooldown since the previous call has elapsed.
    pub fn wait(&self) {
        let mut last_call = self.last_call.lock();
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        *last_call = Some(Instant::now());
    }
}

/// A collaborator whose calls are spaced by a [`Cooldown`].
#[derive(Debug)]
pub struct Throttled<T> {
    inner: T,
    cooldown: Cooldown,
}

impl<T> Throttled<T> {
    pub fn new(inner: T, interval: Duration) -> Self {
        Self {
            inner,
            cooldown: Cooldown::new(interval),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: AnnotationSource> AnnotationSource for Throttled<T> {
    fn list_books(&self) -> Result<Vec<Book>, TransportError> {
        self.cooldown.wait();
        self.inner.list_books()
    }

    fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>, TransportError> {
        self.cooldown.wait();
        self.inner.list_chapters(book_id)
    }

    fn list_annotations(&self, book_id: &str) -> Result<Vec<Annotation>, TransportError> {
        self.cooldown.wait();
        self.inner.list_annotations(book_id)
    }

    fn list_reviews(&self, book_id: &str) -> Result<BookReviews, TransportError> {
        self.cooldown.wait();
        self.inner.list_reviews(book_id)
    }

    fn reading_stats(&self, book_id: &str) -> Result<Option<ReadingStats>, TransportError> {
        self.cooldown.wait();
        self.inner.reading_stats(book_id)
    }

    fn book_info(&self, book_id: &str) -> Result<BookInfo, TransportError> {
        self.cooldown.wait();
        self.inner.book_info(book_id)
    }
}

impl<T: Destination> Destination for Throttled<T> {
    fn ensure_page(&self, properties: &PageProperties) -> Result<PageHandle, TransportError> {
        self.cooldown.wait();
        self.inner.ensure_page(properties)
    }

    fn synced_sorts(&self) -> Result<HashMap<String, i64>, TransportError> {
        self.cooldown.wait();
        self.inner.synced_sorts()
    }

    fn commit_sort(&self, page_id: &str, sort: i64) -> Result<(), TransportError> {
        self.cooldown.wait();
        self.inner.commit_sort(page_id, sort)
    }

    fn list_existing_blocks(&self, page_id: &str) -> Result<Vec<ExistingBlock>, TransportError> {
        self.cooldown.wait();
        self.inner.list_existing_blocks(page_id)
    }

    fn append_after(
        &self,
        page_id: &str,
        anchor: Option<&str>,
        payloads: &[BlockPayload],
    ) -> Result<Vec<String>, TransportError> {
        self.cooldown.wait();
        self.inner.append_after(page_id, anchor, payloads)
    }

    fn append_children(
        &self,
        block_id: &str,
        payloads: &[BlockPayload],
    ) -> Result<Vec<String>, TransportError> {
        self.cooldown.wait();
        self.inner.append_children(block_id, payloads)
    }

    fn delete_block(&self, block_id: &str) -> Result<(), TransportError> {
        self.cooldown.wait();
        self.inner.delete_block(block_id)
    }
}
