//! Chapter tree builder
//!
//! Turns the flat, pre-ordered chapter list of a book into a bounded-depth
//! hierarchy, hangs annotations off their chapters, and prunes chapters that
//! end up with nothing to show.
//!
//! Nodes live in an arena addressed by [`NodeId`]; the synthetic root is not a
//! node, top-level chapters are simply those without a parent.

use crate::model::{Annotation, Chapter, ChapterId};
use std::collections::{BTreeMap, HashMap};

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct ChapterNode {
    chapter: Chapter,
    /// Level after clamping into `1..=max_level`
    level: u8,
    /// Distance from the synthetic root (top-level chapters are depth 1)
    depth: usize,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    annotations: Vec<Annotation>,
    live: bool,
}

impl ChapterNode {
    pub fn chapter(&self) -> &Chapter {
        &self.chapter
    }

    pub fn chapter_id(&self) -> ChapterId {
        self.chapter.chapter_id
    }

    pub fn title(&self) -> &str {
        &self.chapter.title
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Attached annotations in order key order.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    fn is_removable(&self) -> bool {
        self.live && self.annotations.is_empty() && self.children.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ChapterTree {
    nodes: Vec<ChapterNode>,
    roots: Vec<NodeId>,
    index: HashMap<ChapterId, NodeId>,
    max_level: u8,
}

impl ChapterTree {
    /// Build the hierarchy from chapters in source (pre-)order.
    ///
    /// A chapter's parent is the most recently created chapter one level up.
    /// The input order is trusted: a list that is not a valid pre-order yields
    /// a tree shaped by that order, without an error.
    pub fn build(chapters: &[Chapter], max_level: u8) -> Self {
        let max_level = max_level.max(1);
        let mut tree = Self {
            nodes: Vec::with_capacity(chapters.len()),
            roots: Vec::new(),
            index: HashMap::with_capacity(chapters.len()),
            max_level,
        };

        // level -> most recent node at that level; level 0 is the root
        let mut latest: HashMap<u8, Option<NodeId>> = HashMap::from([(0, None)]);

        for chapter in chapters {
            if tree.index.contains_key(&chapter.chapter_id) {
                tracing::warn!(
                    chapter_id = chapter.chapter_id,
                    "duplicate chapter id, keeping the first occurrence"
                );
                continue;
            }

            let level = clamp_level(chapter.level, max_level);
            if i32::from(level) != chapter.level {
                tracing::debug!(
                    chapter_id = chapter.chapter_id,
                    source_level = chapter.level,
                    level,
                    "chapter level clamped"
                );
            }

            let parent = match latest.get(&(level - 1)) {
                Some(parent) => *parent,
                None => {
                    tracing::warn!(
                        chapter_id = chapter.chapter_id,
                        level,
                        "no enclosing chapter at level {}, attaching to root",
                        level - 1
                    );
                    None
                }
            };

            let id = tree.push(chapter.clone(), level, parent);
            latest.insert(level, Some(id));
        }

        tree
    }

    fn push(&mut self, chapter: Chapter, level: u8, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        let depth = parent.map_or(1, |p| self.nodes[p].depth + 1);

        self.index.insert(chapter.chapter_id, id);
        self.nodes.push(ChapterNode {
            chapter,
            level,
            depth,
            parent,
            children: Vec::new(),
            annotations: Vec::new(),
            live: true,
        });

        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Hang annotations off their chapters (no chapter id means the first
    /// chapter). Returns the annotations whose chapter does not exist.
    pub fn attach(&mut self, annotations: Vec<Annotation>) -> Vec<Annotation> {
        let mut groups: BTreeMap<ChapterId, Vec<Annotation>> = BTreeMap::new();
        for annotation in annotations {
            groups.entry(annotation.chapter()).or_default().push(annotation);
        }

        let mut orphans = Vec::new();
        for (chapter_id, mut group) in groups {
            let node = self
                .index
                .get(&chapter_id)
                .map(|&id| &mut self.nodes[id])
                .filter(|node| node.live);

            match node {
                Some(node) => {
                    node.annotations.append(&mut group);
                    node.annotations.sort_by_key(|a| a.range_start);
                }
                None => {
                    tracing::warn!(
                        chapter_id,
                        count = group.len(),
                        "chapter info not found for annotations"
                    );
                    orphans.append(&mut group);
                }
            }
        }
        orphans
    }

    /// Remove chapters with no annotation and no remaining child, deepest
    /// level first, so emptiness cascades upwards in one pass.
    ///
    /// Returns the number of removed chapters.
    pub fn prune(&mut self) -> usize {
        let mut removed = 0;
        for depth in (1..=self.depth()).rev() {
            let doomed: Vec<NodeId> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(_, node)| node.depth == depth && node.is_removable())
                .map(|(id, _)| id)
                .collect();

            for id in doomed {
                self.remove(id);
                removed += 1;
            }
        }
        removed
    }

    fn remove(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        node.live = false;
        let chapter_id = node.chapter.chapter_id;
        let parent = node.parent;

        self.index.remove(&chapter_id);
        match parent {
            Some(p) => self.nodes[p].children.retain(|&c| c != id),
            None => self.roots.retain(|&c| c != id),
        }
    }

    /// Chapters in document (depth-first, source) order.
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            tree: self,
            stack: self.roots.iter().rev().copied().collect(),
        }
    }

    pub fn get(&self, chapter_id: ChapterId) -> Option<&ChapterNode> {
        self.index.get(&chapter_id).map(|&id| &self.nodes[id])
    }

    /// Chapter id of the enclosing chapter, `None` for top-level chapters.
    pub fn parent_of(&self, chapter_id: ChapterId) -> Option<ChapterId> {
        let node = self.get(chapter_id)?;
        node.parent.map(|p| self.nodes[p].chapter_id())
    }

    /// Deepest live depth (0 for an empty tree).
    pub fn depth(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.live)
            .map(|n| n.depth)
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }
}

fn clamp_level(level: i32, max_level: u8) -> u8 {
    level.clamp(1, i32::from(max_level)) as u8
}

pub struct PreOrder<'a> {
    tree: &'a ChapterTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a ChapterNode;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = &self.tree.nodes[id];
        self.stack.extend(node.children.iter().rev().copied());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: ChapterId, level: i32) -> Chapter {
        Chapter {
            chapter_id: id,
            level,
            title: format!("Chapter {id}"),
        }
    }

    fn highlight(id: &str, chapter: Option<ChapterId>, range_start: u64) -> Annotation {
        Annotation {
            logical_id: id.to_string(),
            chapter_id: chapter,
            kind: Default::default(),
            text: format!("text {id}"),
            style: None,
            color: None,
            range_start,
            note: None,
        }
    }

    fn ids(tree: &ChapterTree) -> Vec<ChapterId> {
        tree.iter().map(|n| n.chapter_id()).collect()
    }

    #[test]
    fn test_build_nests_by_level() {
        let tree = ChapterTree::build(
            &[
                chapter(1, 1),
                chapter(2, 2),
                chapter(3, 3),
                chapter(4, 2),
                chapter(5, 1),
            ],
            3,
        );

        assert_eq!(ids(&tree), vec![1, 2, 3, 4, 5]);
        assert_eq!(tree.parent_of(1), None);
        assert_eq!(tree.parent_of(2), Some(1));
        assert_eq!(tree.parent_of(3), Some(2));
        assert_eq!(tree.parent_of(4), Some(1));
        assert_eq!(tree.parent_of(5), None);
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn test_levels_are_clamped() {
        let tree = ChapterTree::build(
            &[chapter(1, 0), chapter(2, 2), chapter(3, 3), chapter(4, 6)],
            3,
        );

        assert_eq!(tree.get(1).unwrap().level(), 1);
        assert_eq!(tree.get(4).unwrap().level(), 3);
        // Collapsed chapters still nest under the deepest supported parent
        assert_eq!(tree.parent_of(4), Some(2));
        assert!(tree.depth() <= 3);
    }

    #[test]
    fn test_missing_parent_level_attaches_to_root() {
        let tree = ChapterTree::build(&[chapter(7, 3), chapter(8, 1)], 3);
        assert_eq!(tree.parent_of(7), None);
        assert_eq!(tree.get(7).unwrap().depth(), 1);
        assert_eq!(tree.get(7).unwrap().level(), 3);
    }

    #[test]
    fn test_duplicate_chapter_keeps_first() {
        let mut dup = chapter(1, 2);
        dup.title = "Again".to_string();
        let tree = ChapterTree::build(&[chapter(1, 1), dup], 3);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(1).unwrap().title(), "Chapter 1");
    }

    #[test]
    fn test_attach_groups_and_orders() {
        let mut tree = ChapterTree::build(&[chapter(1, 1), chapter(2, 1)], 3);
        let orphans = tree.attach(vec![
            highlight("b", Some(2), 90),
            highlight("a", Some(2), 10),
            highlight("c", None, 5),
            highlight("x", Some(99), 0),
        ]);

        let in_two: Vec<&str> = tree
            .get(2)
            .unwrap()
            .annotations()
            .iter()
            .map(|a| a.logical_id.as_str())
            .collect();
        assert_eq!(in_two, vec!["a", "b"]);
        assert_eq!(tree.get(1).unwrap().annotations()[0].logical_id, "c");
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].logical_id, "x");
    }

    #[test]
    fn test_prune_cascades_bottom_up() {
        let mut tree = ChapterTree::build(
            &[
                chapter(1, 1),
                chapter(2, 2),
                chapter(3, 3),
                chapter(4, 1),
                chapter(5, 2),
                chapter(6, 3),
            ],
            3,
        );
        tree.attach(vec![highlight("keep", Some(6), 0)]);

        let removed = tree.prune();

        assert_eq!(removed, 3);
        assert_eq!(ids(&tree), vec![4, 5, 6]);
        assert!(tree.get(1).is_none());
    }

    #[test]
    fn test_prune_keeps_annotated_parent_with_empty_children() {
        let mut tree = ChapterTree::build(&[chapter(1, 1), chapter(2, 2)], 3);
        tree.attach(vec![highlight("a", Some(1), 0)]);
        tree.prune();
        assert_eq!(ids(&tree), vec![1]);
    }

    #[test]
    fn test_prune_empty_tree_removes_everything() {
        let mut tree = ChapterTree::build(&[chapter(1, 1), chapter(2, 2)], 3);
        assert_eq!(tree.prune(), 2);
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.prune(), 0);
    }
}
