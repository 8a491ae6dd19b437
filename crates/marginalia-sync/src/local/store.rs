//! Destination keeping pages as block trees, in memory or in a JSON file

use crate::destination::{Destination, PageHandle, PageProperties};
use crate::error::TransportError;
use crate::model::{BlockPayload, ExistingBlock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBlock {
    pub id: String,
    pub payload: BlockPayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StoredBlock>,
}

impl StoredBlock {
    fn new(payload: BlockPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPage {
    pub page_id: String,
    pub properties: PageProperties,
    /// Book sort marker of the last completed pass
    #[serde(default)]
    pub synced_sort: Option<i64>,
    #[serde(default)]
    pub blocks: Vec<StoredBlock>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    pages: Vec<StoredPage>,
}

impl StoreState {
    fn page_mut(&mut self, page_id: &str) -> Result<&mut StoredPage, TransportError> {
        self.pages
            .iter_mut()
            .find(|p| p.page_id == page_id)
            .ok_or_else(|| TransportError::NotFound(format!("page {page_id}")))
    }

    fn block_mut(&mut self, block_id: &str) -> Option<&mut StoredBlock> {
        self.pages
            .iter_mut()
            .find_map(|p| find_block(&mut p.blocks, block_id))
    }
}

fn find_block<'a>(blocks: &'a mut [StoredBlock], block_id: &str) -> Option<&'a mut StoredBlock> {
    for block in blocks {
        if block.id == block_id {
            return Some(block);
        }
        if let Some(found) = find_block(&mut block.children, block_id) {
            return Some(found);
        }
    }
    None
}

fn remove_block(blocks: &mut Vec<StoredBlock>, block_id: &str) -> bool {
    if let Some(pos) = blocks.iter().position(|b| b.id == block_id) {
        blocks.remove(pos);
        return true;
    }
    blocks
        .iter_mut()
        .any(|b| remove_block(&mut b.children, block_id))
}

pub struct LocalDocumentStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl LocalDocumentStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Load the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            StoreState::default()
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the page holding `book_id`.
    pub fn page_for(&self, book_id: &str) -> Option<StoredPage> {
        self.state
            .lock()
            .pages
            .iter()
            .find(|p| p.properties.book_id == book_id)
            .cloned()
    }

    pub fn pages(&self) -> Vec<StoredPage> {
        self.state.lock().pages.clone()
    }

    fn persist(&self, state: &StoreState) -> Result<(), TransportError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl std::fmt::Debug for LocalDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDocumentStore")
            .field("path", &self.path)
            .field("pages", &self.state.lock().pages.len())
            .finish()
    }
}

impl Destination for LocalDocumentStore {
    fn ensure_page(&self, properties: &PageProperties) -> Result<PageHandle, TransportError> {
        let mut state = self.state.lock();
        let book_id = &properties.book_id;
        let handle = match state.pages.iter_mut().find(|p| &p.properties.book_id == book_id) {
            Some(page) => {
                page.properties = properties.clone();
                PageHandle {
                    page_id: page.page_id.clone(),
                    created: false,
                }
            }
            None => {
                let page_id = Uuid::new_v4().to_string();
                state.pages.push(StoredPage {
                    page_id: page_id.clone(),
                    properties: properties.clone(),
                    synced_sort: None,
                    blocks: Vec::new(),
                });
                tracing::info!(book_id = %book_id, page_id = %page_id, "created page");
                PageHandle {
                    page_id,
                    created: true,
                }
            }
        };
        self.persist(&state)?;
        Ok(handle)
    }

    fn synced_sorts(&self) -> Result<HashMap<String, i64>, TransportError> {
        Ok(self
            .state
            .lock()
            .pages
            .iter()
            .filter_map(|p| Some((p.properties.book_id.clone(), p.synced_sort?)))
            .collect())
    }

    fn commit_sort(&self, page_id: &str, sort: i64) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.page_mut(page_id)?.synced_sort = Some(sort);
        self.persist(&state)
    }

    fn list_existing_blocks(&self, page_id: &str) -> Result<Vec<ExistingBlock>, TransportError> {
        let mut state = self.state.lock();
        let page = state.page_mut(page_id)?;
        Ok(page
            .blocks
            .iter()
            .map(|b| ExistingBlock::new(b.id.clone(), b.payload.kind()))
            .collect())
    }

    fn append_after(
        &self,
        page_id: &str,
        anchor: Option<&str>,
        payloads: &[BlockPayload],
    ) -> Result<Vec<String>, TransportError> {
        let mut state = self.state.lock();
        let page = state.page_mut(page_id)?;
        let at = match anchor {
            Some(anchor) => {
                page.blocks
                    .iter()
                    .position(|b| b.id == anchor)
                    .ok_or_else(|| TransportError::NotFound(format!("block {anchor}")))?
                    + 1
            }
            None => page.blocks.len(),
        };

        let created: Vec<StoredBlock> = payloads.iter().cloned().map(StoredBlock::new).collect();
        let ids = created.iter().map(|b| b.id.clone()).collect();
        page.blocks.splice(at..at, created);

        self.persist(&state)?;
        Ok(ids)
    }

    fn append_children(
        &self,
        block_id: &str,
        payloads: &[BlockPayload],
    ) -> Result<Vec<String>, TransportError> {
        let mut state = self.state.lock();
        let parent = state
            .block_mut(block_id)
            .ok_or_else(|| TransportError::NotFound(format!("block {block_id}")))?;

        let created: Vec<StoredBlock> = payloads.iter().cloned().map(StoredBlock::new).collect();
        let ids = created.iter().map(|b| b.id.clone()).collect();
        parent.children.extend(created);

        self.persist(&state)?;
        Ok(ids)
    }

    fn delete_block(&self, block_id: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let removed = state
            .pages
            .iter_mut()
            .any(|p| remove_block(&mut p.blocks, block_id));
        if !removed {
            return Err(TransportError::NotFound(format!("block {block_id}")));
        }
        self.persist(&state)
    }
}
