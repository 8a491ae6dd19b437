//! File-backed collaborators for running a sync without network access.

mod export;
mod store;

pub use export::{ExportFile, ExportSource, ExportedBook};
pub use store::{LocalDocumentStore, StoredBlock, StoredPage};
