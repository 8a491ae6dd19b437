//! Position resolver
//!
//! The destination only exposes a flat list of top-level block ids. Combined
//! with the ledger this is enough to recover where each chapter's section
//! starts and ends, and therefore where new content has to be appended.
//!
//! The sequence is a snapshot taken once per pass; it is never mutated while
//! the pass compiles its requests.

use crate::model::{BlockKind, ChapterId, ExistingBlock};
use marginalia_ledger::{Ledger, LedgerError};

/// A destination block, with the logical id that produced it if this engine
/// wrote it in an earlier pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBlock {
    pub block_id: String,
    pub kind: BlockKind,
    pub logical_id: Option<String>,
}

impl ResolvedBlock {
    /// Chapter id of a heading written for a chapter.
    fn chapter_id(&self) -> Option<ChapterId> {
        if !self.kind.is_heading() {
            return None;
        }
        self.logical_id.as_deref()?.parse().ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSequence {
    blocks: Vec<ResolvedBlock>,
}

impl BlockSequence {
    pub fn new(blocks: Vec<ResolvedBlock>) -> Self {
        Self { blocks }
    }

    /// Resolve every listed block against the ledger of `scope_id`.
    pub fn resolve(
        scope_id: &str,
        blocks: Vec<ExistingBlock>,
        ledger: &dyn Ledger,
    ) -> Result<Self, LedgerError> {
        let blocks = blocks
            .into_iter()
            .map(|block| {
                let logical_id = ledger.lookup_by_materialized(scope_id, &block.block_id)?;
                Ok(ResolvedBlock {
                    block_id: block.block_id,
                    kind: block.kind,
                    logical_id,
                })
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;
        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[ResolvedBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, block_id: &str) -> bool {
        self.position(block_id).is_some()
    }

    fn position(&self, block_id: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.block_id == block_id)
    }

    /// Block after which content for `target` must be appended.
    ///
    /// Picks the heading of the closest chapter at or before `target` and
    /// returns the last block of its section (the heading itself when the
    /// section is empty). Without such a heading, content goes after the first
    /// block; an empty sequence yields `None`.
    pub fn find_anchor(&self, target: ChapterId) -> Option<&str> {
        let mut best: Option<(ChapterId, usize)> = None;
        for (idx, block) in self.blocks.iter().enumerate() {
            let Some(chapter_id) = block.chapter_id() else {
                continue;
            };
            if chapter_id <= target && best.map_or(true, |(found, _)| chapter_id > found) {
                best = Some((chapter_id, idx));
            }
        }

        match best {
            Some((_, idx)) => Some(self.tail_from(idx)),
            None => self.blocks.first().map(|b| b.block_id.as_str()),
        }
    }

    /// Last block of the section opened by `heading_id`, or `None` if the
    /// heading is not in the sequence.
    pub fn section_tail(&self, heading_id: &str) -> Option<&str> {
        self.position(heading_id).map(|idx| self.tail_from(idx))
    }

    fn tail_from(&self, idx: usize) -> &str {
        let mut last = idx;
        for (i, block) in self.blocks.iter().enumerate().skip(idx + 1) {
            if block.kind.is_heading() {
                break;
            }
            last = i;
        }
        &self.blocks[last].block_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(id: &str, chapter: Option<ChapterId>) -> ResolvedBlock {
        ResolvedBlock {
            block_id: id.to_string(),
            kind: BlockKind::Heading(2),
            logical_id: chapter.map(|c| c.to_string()),
        }
    }

    fn body(id: &str) -> ResolvedBlock {
        ResolvedBlock {
            block_id: id.to_string(),
            kind: BlockKind::Paragraph,
            logical_id: None,
        }
    }

    fn toc(id: &str) -> ResolvedBlock {
        ResolvedBlock {
            block_id: id.to_string(),
            kind: BlockKind::TableOfContents,
            logical_id: None,
        }
    }

    #[test]
    fn test_empty_sequence_has_no_anchor() {
        assert_eq!(BlockSequence::default().find_anchor(1), None);
    }

    #[test]
    fn test_single_heading_is_its_own_tail() {
        let seq = BlockSequence::new(vec![heading("block_id_1", Some(1))]);
        assert_eq!(seq.find_anchor(2), Some("block_id_1"));
    }

    #[test]
    fn test_no_preceding_chapter_goes_after_first_block() {
        let seq = BlockSequence::new(vec![toc("toc_id"), heading("block_id_2", Some(2))]);
        assert_eq!(seq.find_anchor(1), Some("toc_id"));
    }

    #[test]
    fn test_gap_between_chapters() {
        // [H(3), B, B, H(5), B], target 4
        let seq = BlockSequence::new(vec![
            heading("h3", Some(3)),
            body("b1"),
            body("b2"),
            heading("h5", Some(5)),
            body("b3"),
        ]);
        assert_eq!(seq.find_anchor(4), Some("b2"));
    }

    #[test]
    fn test_closest_preceding_heading_wins() {
        let seq = BlockSequence::new(vec![
            toc("toc_id"),
            heading("block_3", Some(3)),
            heading("block_5", Some(5)),
            heading("block_7", Some(7)),
        ]);
        assert_eq!(seq.find_anchor(4), Some("block_3"));
        assert_eq!(seq.find_anchor(6), Some("block_5"));
        assert_eq!(seq.find_anchor(100), Some("block_7"));
    }

    #[test]
    fn test_existing_chapter_resolves_to_its_own_tail() {
        let seq = BlockSequence::new(vec![
            heading("h1", Some(1)),
            body("b1"),
            heading("h2", Some(2)),
            body("b2"),
            body("b3"),
            heading("h3", Some(3)),
        ]);
        assert_eq!(seq.find_anchor(2), Some("b3"));
    }

    #[test]
    fn test_unmanaged_and_section_headings_are_not_candidates() {
        let seq = BlockSequence::new(vec![
            toc("toc"),
            heading("manual", None),
            body("b0"),
            heading("h2", Some(2)),
            body("b1"),
            ResolvedBlock {
                block_id: "reviews".to_string(),
                kind: BlockKind::Heading(1),
                logical_id: Some("_comment_".to_string()),
            },
            body("r1"),
        ]);
        // Non-numeric logical ids never qualify, but still end a section
        assert_eq!(seq.find_anchor(1), Some("toc"));
        assert_eq!(seq.find_anchor(9), Some("b1"));
        assert_eq!(seq.section_tail("reviews"), Some("r1"));
        assert_eq!(seq.section_tail("missing"), None);
    }

    #[test]
    fn test_last_chapter_tail_runs_through_section_divider() {
        let seq = BlockSequence::new(vec![
            heading("h1", Some(1)),
            body("b1"),
            ResolvedBlock {
                block_id: "divider".to_string(),
                kind: BlockKind::Divider,
                logical_id: None,
            },
            ResolvedBlock {
                block_id: "reviews".to_string(),
                kind: BlockKind::Heading(1),
                logical_id: Some("_comment_".to_string()),
            },
        ]);
        // Only headings close a section
        assert_eq!(seq.find_anchor(1), Some("divider"));
    }

    #[test]
    fn test_numeric_id_on_non_heading_is_ignored() {
        let seq = BlockSequence::new(vec![
            body("first"),
            ResolvedBlock {
                block_id: "para".to_string(),
                kind: BlockKind::Paragraph,
                logical_id: Some("3".to_string()),
            },
        ]);
        assert_eq!(seq.find_anchor(5), Some("first"));
    }
}
