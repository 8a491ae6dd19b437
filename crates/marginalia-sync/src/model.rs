//! Typed records at the source and destination boundaries.
//!
//! Source payloads are loosely typed (optional keys, camelCase names); they are
//! validated into these records once, at ingestion, and never accessed by key
//! afterwards.

use serde::{Deserialize, Serialize};

/// Source-side chapter identifier (`chapterUid`).
pub type ChapterId = i64;

/// Chapter assumed for annotations that carry no chapter id.
pub const DEFAULT_CHAPTER: ChapterId = 1;

// ============================================================================
// Source Records
// ============================================================================

/// A book with annotations: the unit of synchronization and the ledger scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    #[serde(alias = "bookId")]
    pub book_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub cover: Option<String>,
    /// Source-side change marker; grows whenever the book's notes change
    #[serde(default)]
    pub sort: i64,
    #[serde(default, alias = "noteCount")]
    pub note_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(alias = "chapterUid")]
    pub chapter_id: ChapterId,
    /// Raw source level; may be out of range, the tree builder clamps it
    #[serde(default = "default_level")]
    pub level: i32,
    #[serde(default)]
    pub title: String,
}

fn default_level() -> i32 {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Marked passage (bookmark)
    #[default]
    Highlight,
    /// Reader's review attached to a chapter
    Review,
}

/// A highlight or chapter review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Bookmark id or review id
    #[serde(alias = "bookmarkId", alias = "reviewId")]
    pub logical_id: String,
    #[serde(default, alias = "chapterUid")]
    pub chapter_id: Option<ChapterId>,
    #[serde(default)]
    pub kind: AnnotationKind,
    #[serde(default, alias = "markText", alias = "content")]
    pub text: String,
    /// Highlight style (0 = straight line, 1 = background, 2 = wavy)
    #[serde(default)]
    pub style: Option<i32>,
    #[serde(default, alias = "colorStyle")]
    pub color: Option<i32>,
    /// Offset of the passage inside the chapter
    #[serde(default, alias = "rangeStart")]
    pub range_start: u64,
    /// Author's note or quoted passage, written as a child block
    #[serde(default, alias = "abstract")]
    pub note: Option<String>,
}

impl Annotation {
    /// Chapter this annotation belongs to, defaulting to the first chapter.
    pub fn chapter(&self) -> ChapterId {
        self.chapter_id.unwrap_or(DEFAULT_CHAPTER)
    }

    /// Document order: chapter first, then position inside the chapter.
    pub fn order_key(&self) -> (ChapterId, u64) {
        (self.chapter(), self.range_start)
    }
}

/// A book-level review shown in the review summary section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    #[serde(alias = "reviewId")]
    pub review_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub style: Option<i32>,
    #[serde(default, alias = "colorStyle")]
    pub color: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingStats {
    #[serde(default, alias = "totalReadDay")]
    pub total_days: u32,
    #[serde(default, alias = "continueReadDays")]
    pub longest_streak_days: u32,
    /// Longest single-day reading time, seconds
    #[serde(default, alias = "longestReadingTime")]
    pub longest_session_seconds: u64,
    /// Unix timestamp of that day
    #[serde(default, alias = "longestReadingDate")]
    pub longest_session_date: i64,
    #[serde(default, alias = "data")]
    pub daily_breakdown: Vec<DailyReading>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReading {
    /// Unix timestamp of the day
    #[serde(alias = "readDate")]
    pub date: i64,
    #[serde(default, alias = "readTime")]
    pub seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    Reading,
    Finished,
}

impl ReadingStatus {
    /// Source progress code; 4 marks a finished book.
    pub fn from_marked_status(code: i32) -> Self {
        if code == 4 {
            Self::Finished
        } else {
            Self::Reading
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Reading => "Reading",
            Self::Finished => "Finished",
        }
    }
}

/// Per-book metadata shown as page properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInfo {
    #[serde(default)]
    pub isbn: String,
    /// Public rating, per mille
    #[serde(default, alias = "newRating")]
    pub rating: Option<u32>,
    #[serde(default)]
    pub category: String,
    /// `None` when the reader never opened the book
    #[serde(default)]
    pub status: Option<ReadingStatus>,
    /// Total reading time, seconds
    #[serde(default, alias = "readingTime")]
    pub reading_seconds: u64,
    #[serde(default, alias = "lastReadingDate")]
    pub last_read: Option<i64>,
    #[serde(default, alias = "finishedDate")]
    pub finished_at: Option<i64>,
}

// ============================================================================
// Destination Records
// ============================================================================

/// Destination block type, as far as the engine needs to tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    BulletedListItem,
    Callout,
    Quote,
    Divider,
    TableOfContents,
    Table,
    TableRow,
    Other(String),
}

impl BlockKind {
    pub fn is_heading(&self) -> bool {
        matches!(self, Self::Heading(_))
    }

    pub fn from_tag(tag: &str) -> Self {
        if let Some(level) = tag.strip_prefix("heading_") {
            if let Ok(level) = level.parse::<u8>() {
                return Self::Heading(level);
            }
        }
        match tag {
            "paragraph" => Self::Paragraph,
            "bulleted_list_item" => Self::BulletedListItem,
            "callout" => Self::Callout,
            "quote" => Self::Quote,
            "divider" => Self::Divider,
            "table_of_contents" => Self::TableOfContents,
            "table" => Self::Table,
            "table_row" => Self::TableRow,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn tag(&self) -> String {
        match self {
            Self::Heading(level) => format!("heading_{level}"),
            Self::Paragraph => "paragraph".to_string(),
            Self::BulletedListItem => "bulleted_list_item".to_string(),
            Self::Callout => "callout".to_string(),
            Self::Quote => "quote".to_string(),
            Self::Divider => "divider".to_string(),
            Self::TableOfContents => "table_of_contents".to_string(),
            Self::Table => "table".to_string(),
            Self::TableRow => "table_row".to_string(),
            Self::Other(tag) => tag.clone(),
        }
    }
}

impl From<String> for BlockKind {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<BlockKind> for String {
    fn from(kind: BlockKind) -> Self {
        kind.tag()
    }
}

/// A top-level block as listed by the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingBlock {
    #[serde(alias = "id")]
    pub block_id: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
}

impl ExistingBlock {
    pub fn new(block_id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            block_id: block_id.into(),
            kind,
        }
    }
}

/// Opaque block content; only its `type` tag is meaningful to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockPayload(pub serde_json::Value);

impl BlockPayload {
    pub fn kind(&self) -> BlockKind {
        self.0
            .get("type")
            .and_then(|t| t.as_str())
            .map(BlockKind::from_tag)
            .unwrap_or_else(|| BlockKind::Other(String::new()))
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    /// Text content of the block; table row cells are joined with ` | `.
    pub fn plain_text(&self) -> String {
        let Some(tag) = self.0.get("type").and_then(|t| t.as_str()) else {
            return String::new();
        };
        let body = &self.0[tag];
        if let Some(cells) = body.get("cells").and_then(|c| c.as_array()) {
            return cells.iter().map(join_rich_text).collect::<Vec<_>>().join(" | ");
        }
        body.get("rich_text").map(join_rich_text).unwrap_or_default()
    }
}

fn join_rich_text(parts: &serde_json::Value) -> String {
    parts
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"]["content"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// One block to materialize, positioned after a precomputed anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertionRequest {
    /// Block to append after; `None` appends at the end of the document
    pub anchor: Option<String>,
    /// Recorded in the ledger once materialized; `None` for structural blocks
    pub logical_id: Option<String>,
    pub payload: BlockPayload,
    /// Appended under the new block once it exists
    pub children: Vec<BlockPayload>,
}

impl InsertionRequest {
    /// A block that is never recorded (divider, table of contents).
    pub fn structural(anchor: Option<String>, payload: BlockPayload) -> Self {
        Self {
            anchor,
            logical_id: None,
            payload,
            children: Vec::new(),
        }
    }

    pub fn tracked(
        anchor: Option<String>,
        logical_id: impl Into<String>,
        payload: BlockPayload,
    ) -> Self {
        Self {
            anchor,
            logical_id: Some(logical_id.into()),
            payload,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<BlockPayload>) -> Self {
        self.children = children;
        self
    }
}
