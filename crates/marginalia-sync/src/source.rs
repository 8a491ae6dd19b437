//! Annotation source collaborator

use crate::error::TransportError;
use crate::model::{Annotation, Book, BookInfo, Chapter, ReadingStats, ReviewItem};

/// Reviews of a book, split the way the pass consumes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookReviews {
    /// Book-level reviews for the review summary section
    pub summary: Vec<ReviewItem>,
    /// Reviews attached to a chapter; merged into the annotation list
    pub chapter_reviews: Vec<Annotation>,
}

/// Read-only access to the reading annotations of a user.
pub trait AnnotationSource {
    /// Books that carry annotations.
    fn list_books(&self) -> Result<Vec<Book>, TransportError>;

    /// Chapters in source (pre-)order.
    fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>, TransportError>;

    fn list_annotations(&self, book_id: &str) -> Result<Vec<Annotation>, TransportError>;

    fn list_reviews(&self, book_id: &str) -> Result<BookReviews, TransportError>;

    /// `None` when the source keeps no reading statistics for the book.
    fn reading_stats(&self, book_id: &str) -> Result<Option<ReadingStats>, TransportError>;

    /// Metadata for the page properties; defaults when the source has none.
    fn book_info(&self, book_id: &str) -> Result<BookInfo, TransportError>;
}
