//! Block compiler
//!
//! Walks the pruned chapter tree in document order and turns everything the
//! ledger does not know yet into insertion requests:
//!
//! ```text
//!   [toc, divider]            fresh page only
//!   chapter heading           unless recorded
//!     annotation (+ note)     unless recorded
//!   ...
//!   divider, review heading   "_comment_", unless recorded
//!     review                  unless recorded
//!   divider, stats heading    "_stat_", unless recorded
//!     totals table            "_stat.total_", always rewritten
//!     daily table             "_stat.detail_", always rewritten
//! ```
//!
//! Every anchor is computed here, against one snapshot of the destination;
//! the dispatcher never resolves positions itself.

use crate::config::{FormatConfig, SyncConfig};
use crate::format::{self, BlockFormatter};
use crate::model::{
    Annotation, AnnotationKind, BlockPayload, Chapter, InsertionRequest, ReadingStats, ReviewItem,
};
use crate::position::BlockSequence;
use crate::tree::ChapterTree;
use marginalia_ledger::{Ledger, LedgerError};

/// Logical id of the review summary heading.
pub const REVIEW_SECTION: &str = "_comment_";
/// Logical id of the reading statistics heading.
pub const STATS_SECTION: &str = "_stat_";
pub const STATS_TOTAL: &str = "_stat.total_";
pub const STATS_DETAIL: &str = "_stat.detail_";

/// Everything the source knows about one book.
#[derive(Debug, Clone, Default)]
pub struct BookContent {
    pub chapters: Vec<Chapter>,
    /// Highlights and chapter reviews, in order key order
    pub annotations: Vec<Annotation>,
    pub summary: Vec<ReviewItem>,
    pub stats: Option<ReadingStats>,
}

/// A previously written aggregate block that must be removed before its
/// replacement is flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retirement {
    pub logical_id: String,
    pub materialized_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct CompiledPass {
    pub requests: Vec<InsertionRequest>,
    pub retirements: Vec<Retirement>,
    /// Annotations whose chapter does not exist; never written
    pub orphans: Vec<Annotation>,
    pub pruned_chapters: usize,
}

pub struct BlockCompiler<'a> {
    formatter: &'a dyn BlockFormatter,
    ledger: &'a dyn Ledger,
    format: &'a FormatConfig,
    max_level: u8,
}

impl<'a> BlockCompiler<'a> {
    pub fn new(
        formatter: &'a dyn BlockFormatter,
        ledger: &'a dyn Ledger,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            formatter,
            ledger,
            format: &config.format,
            max_level: config.max_heading_level,
        }
    }

    /// Compile the requests of one pass over `scope_id`, given the blocks
    /// currently on its page.
    pub fn compile(
        &self,
        scope_id: &str,
        content: &BookContent,
        sequence: &BlockSequence,
    ) -> Result<CompiledPass, LedgerError> {
        let mut pass = CompiledPass::default();

        if sequence.is_empty() {
            pass.requests.push(InsertionRequest::structural(
                None,
                self.formatter.table_of_contents(),
            ));
            pass.requests
                .push(InsertionRequest::structural(None, self.formatter.divider()));
        }

        if content.chapters.is_empty() {
            for annotation in &content.annotations {
                if !self.recorded(scope_id, &annotation.logical_id)? {
                    pass.requests.push(self.annotation_request(None, annotation));
                }
            }
        } else {
            self.compile_chapters(scope_id, content, sequence, &mut pass)?;
        }

        if !content.summary.is_empty() {
            self.compile_reviews(scope_id, &content.summary, sequence, &mut pass)?;
        }

        if let Some(stats) = content.stats.as_ref() {
            if self.format.reading_detail_enabled {
                let note_count = content.annotations.len();
                self.compile_stats(scope_id, stats, note_count, sequence, &mut pass)?;
            }
        }

        tracing::debug!(
            scope_id,
            requests = pass.requests.len(),
            retirements = pass.retirements.len(),
            orphans = pass.orphans.len(),
            "compiled pass"
        );
        Ok(pass)
    }

    fn compile_chapters(
        &self,
        scope_id: &str,
        content: &BookContent,
        sequence: &BlockSequence,
        pass: &mut CompiledPass,
    ) -> Result<(), LedgerError> {
        let mut tree = ChapterTree::build(&content.chapters, self.max_level);
        pass.orphans = tree.attach(content.annotations.clone());
        pass.pruned_chapters = tree.prune();

        for node in tree.iter() {
            let anchor = sequence.find_anchor(node.chapter_id()).map(str::to_string);

            let chapter_key = node.chapter_id().to_string();
            if !self.recorded(scope_id, &chapter_key)? {
                pass.requests.push(InsertionRequest::tracked(
                    anchor.clone(),
                    chapter_key,
                    self.formatter.heading(node.level(), node.title()),
                ));
            }

            for annotation in node.annotations() {
                if !self.recorded(scope_id, &annotation.logical_id)? {
                    pass.requests
                        .push(self.annotation_request(anchor.clone(), annotation));
                }
            }
        }
        Ok(())
    }

    fn compile_reviews(
        &self,
        scope_id: &str,
        summary: &[ReviewItem],
        sequence: &BlockSequence,
        pass: &mut CompiledPass,
    ) -> Result<(), LedgerError> {
        let anchor = match self.ledger.lookup_by_logical(scope_id, REVIEW_SECTION)? {
            Some(heading_id) => tail_or_end(sequence, &heading_id, REVIEW_SECTION),
            None => {
                self.open_section(REVIEW_SECTION, &self.format.review_heading, pass);
                None
            }
        };

        for review in summary {
            if self.recorded(scope_id, &review.review_id)? {
                continue;
            }
            pass.requests.push(InsertionRequest::tracked(
                anchor.clone(),
                review.review_id.clone(),
                self.formatter.content(
                    &review.content,
                    review.style,
                    review.color,
                    AnnotationKind::Review,
                ),
            ));
        }
        Ok(())
    }

    fn compile_stats(
        &self,
        scope_id: &str,
        stats: &ReadingStats,
        note_count: usize,
        sequence: &BlockSequence,
        pass: &mut CompiledPass,
    ) -> Result<(), LedgerError> {
        // Tables go right after the heading: the previous ones are retired
        let anchor = match self.ledger.lookup_by_logical(scope_id, STATS_SECTION)? {
            Some(heading_id) if sequence.contains(&heading_id) => Some(heading_id),
            Some(heading_id) => {
                tracing::warn!(
                    scope_id,
                    block_id = %heading_id,
                    "statistics heading is recorded but missing, appending at the end"
                );
                None
            }
            None => {
                self.open_section(STATS_SECTION, &self.format.stats_heading, pass);
                None
            }
        };

        for logical_id in [STATS_TOTAL, STATS_DETAIL] {
            if let Some(materialized_id) = self.ledger.lookup_by_logical(scope_id, logical_id)? {
                pass.retirements.push(Retirement {
                    logical_id: logical_id.to_string(),
                    materialized_id,
                });
            }
        }

        let totals = [
            ["Total reading days".to_string(), format!("{} days", stats.total_days)],
            [
                "Longest streak".to_string(),
                format!("{} days", stats.longest_streak_days),
            ],
            [
                "Longest single day".to_string(),
                format!(
                    "{} ({})",
                    format::reading_time(stats.longest_session_seconds),
                    format::day(stats.longest_session_date)
                ),
            ],
            ["Notes".to_string(), format!("{note_count} notes")],
        ];
        pass.requests.push(
            InsertionRequest::tracked(
                anchor.clone(),
                STATS_TOTAL,
                self.formatter
                    .table(&["Metric".to_string(), "Value".to_string()]),
            )
            .with_children(totals.iter().map(|row| self.formatter.table_row(row)).collect()),
        );

        let daily: Vec<BlockPayload> = stats
            .daily_breakdown
            .iter()
            .map(|d| {
                self.formatter
                    .table_row(&[format::day(d.date), format::reading_time(d.seconds)])
            })
            .collect();
        pass.requests.push(
            InsertionRequest::tracked(
                anchor,
                STATS_DETAIL,
                self.formatter
                    .table(&["Date".to_string(), "Reading time".to_string()]),
            )
            .with_children(daily),
        );
        Ok(())
    }

    /// Divider plus a recorded level-1 heading, appended at the end.
    fn open_section(&self, logical_id: &str, title: &str, pass: &mut CompiledPass) {
        pass.requests
            .push(InsertionRequest::structural(None, self.formatter.divider()));
        pass.requests.push(InsertionRequest::tracked(
            None,
            logical_id,
            self.formatter.heading(1, title),
        ));
    }

    fn annotation_request(
        &self,
        anchor: Option<String>,
        annotation: &Annotation,
    ) -> InsertionRequest {
        let payload = self.formatter.content(
            &annotation.text,
            annotation.style,
            annotation.color,
            annotation.kind,
        );
        let children = annotation
            .note
            .as_deref()
            .filter(|note| !note.trim().is_empty())
            .map(|note| vec![self.formatter.quote(note)])
            .unwrap_or_default();
        InsertionRequest::tracked(anchor, annotation.logical_id.clone(), payload)
            .with_children(children)
    }

    fn recorded(&self, scope_id: &str, logical_id: &str) -> Result<bool, LedgerError> {
        Ok(self.ledger.lookup_by_logical(scope_id, logical_id)?.is_some())
    }
}

fn tail_or_end(sequence: &BlockSequence, heading_id: &str, section: &str) -> Option<String> {
    match sequence.section_tail(heading_id) {
        Some(tail) => Some(tail.to_string()),
        None => {
            tracing::warn!(
                section,
                block_id = heading_id,
                "section heading is recorded but missing, appending at the end"
            );
            None
        }
    }
}
