//! Annotation source backed by a JSON export file

use crate::error::TransportError;
use crate::model::{
    Annotation, AnnotationKind, Book, BookInfo, Chapter, ReadingStats, ReviewItem,
};
use crate::source::{AnnotationSource, BookReviews};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `{ "books": [ ... ] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportFile {
    #[serde(default)]
    pub books: Vec<ExportedBook>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedBook {
    pub book: Book,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub summary: Vec<ReviewItem>,
    #[serde(default)]
    pub chapter_reviews: Vec<Annotation>,
    #[serde(default)]
    pub stats: Option<ReadingStats>,
    #[serde(default)]
    pub info: BookInfo,
}

#[derive(Debug, Clone, Default)]
pub struct ExportSource {
    books: Vec<ExportedBook>,
}

impl ExportSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let export: ExportFile = serde_json::from_str(&contents)?;
        Ok(Self::from_export(export))
    }

    pub fn from_export(export: ExportFile) -> Self {
        let mut books = export.books;
        for book in &mut books {
            for review in &mut book.chapter_reviews {
                review.kind = AnnotationKind::Review;
            }
        }
        Self { books }
    }

    fn book(&self, book_id: &str) -> Result<&ExportedBook, TransportError> {
        self.books
            .iter()
            .find(|b| b.book.book_id == book_id)
            .ok_or_else(|| TransportError::NotFound(format!("book {book_id}")))
    }
}

impl AnnotationSource for ExportSource {
    fn list_books(&self) -> Result<Vec<Book>, TransportError> {
        Ok(self.books.iter().map(|b| b.book.clone()).collect())
    }

    fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>, TransportError> {
        Ok(self.book(book_id)?.chapters.clone())
    }

    fn list_annotations(&self, book_id: &str) -> Result<Vec<Annotation>, TransportError> {
        Ok(self.book(book_id)?.annotations.clone())
    }

    fn list_reviews(&self, book_id: &str) -> Result<BookReviews, TransportError> {
        let book = self.book(book_id)?;
        Ok(BookReviews {
            summary: book.summary.clone(),
            chapter_reviews: book.chapter_reviews.clone(),
        })
    }

    fn reading_stats(&self, book_id: &str) -> Result<Option<ReadingStats>, TransportError> {
        Ok(self.book(book_id)?.stats.clone())
    }

    fn book_info(&self, book_id: &str) -> Result<BookInfo, TransportError> {
        Ok(self.book(book_id)?.info.clone())
    }
}
