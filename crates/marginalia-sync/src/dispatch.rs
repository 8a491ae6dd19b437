//! Batch dispatcher
//!
//! ```text
//!   requests ──► runs (same anchor) ──► chunks (≤ max_batch) ──► append_after
//!                                                                    │
//!                         append_children ◄── ledger.insert ◄── ids ─┘
//! ```
//!
//! Every tracked block of a chunk is recorded as soon as the chunk's ids come
//! back, before any children are written. A block whose children fail is
//! forgotten and deleted again, so the next pass rewrites it whole.
//!
//! A chunk after the first is appended after the last block of the previous
//! chunk, and a later run sharing an anchor with an earlier one continues
//! after that run's last block, so the destination always ends up in request
//! order. Unanchored runs append at the end of the page.

use crate::destination::Destination;
use crate::error::{Result, SyncError};
use crate::model::{BlockPayload, InsertionRequest};
use marginalia_ledger::Ledger;
use std::collections::HashMap;

/// One top-level append call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendedBatch {
    /// Block the batch was appended after; `None` for the end of the page
    pub after: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Destination append calls, children included
    pub append_calls: usize,
    /// Top-level batches, in the order they were appended
    pub batches: Vec<AppendedBatch>,
    /// `(logical_id, materialized_id)` of every recorded request, in request order
    pub materialized: Vec<(String, String)>,
    /// Blocks created, children included
    pub blocks_created: usize,
}

pub struct BatchDispatcher<'a> {
    destination: &'a dyn Destination,
    ledger: &'a dyn Ledger,
    max_batch: usize,
}

impl<'a> BatchDispatcher<'a> {
    pub fn new(destination: &'a dyn Destination, ledger: &'a dyn Ledger, max_batch: usize) -> Self {
        Self {
            destination,
            ledger,
            max_batch: max_batch.max(1),
        }
    }

    /// Materialize `requests` on `page_id` and record them under `scope_id`.
    ///
    /// Stops at the first failure; everything materialized before it stays
    /// recorded, except a block whose children could not be written.
    pub fn flush(
        &self,
        page_id: &str,
        scope_id: &str,
        requests: &[InsertionRequest],
    ) -> Result<FlushReport> {
        let mut report = FlushReport::default();
        // anchor -> last block placed after it during this flush
        let mut cursors: HashMap<String, String> = HashMap::new();

        let mut start = 0;
        while start < requests.len() {
            let anchor = requests[start].anchor.as_deref();
            let end = requests[start..]
                .iter()
                .position(|r| r.anchor.as_deref() != anchor)
                .map_or(requests.len(), |len| start + len);

            let run = &requests[start..end];
            let after = anchor.map(|a| cursors.get(a).map_or(a, String::as_str).to_string());
            let last = self.flush_run(page_id, scope_id, after, run, &mut report)?;

            if let (Some(anchor), Some(last)) = (anchor, last) {
                cursors.insert(anchor.to_string(), last);
            }
            start = end;
        }

        tracing::debug!(
            scope_id,
            page_id,
            append_calls = report.append_calls,
            recorded = report.materialized.len(),
            "flush complete"
        );
        Ok(report)
    }

    /// Returns the id of the last block appended by the run.
    fn flush_run(
        &self,
        page_id: &str,
        scope_id: &str,
        mut after: Option<String>,
        run: &[InsertionRequest],
        report: &mut FlushReport,
    ) -> Result<Option<String>> {
        let anchored = after.is_some();
        let mut last = None;

        for chunk in run.chunks(self.max_batch) {
            let payloads: Vec<BlockPayload> = chunk.iter().map(|r| r.payload.clone()).collect();
            let ids = self
                .destination
                .append_after(page_id, after.as_deref(), &payloads)?;
            report.append_calls += 1;
            check_count(chunk.len(), ids.len())?;

            tracing::debug!(
                scope_id,
                anchor = after.as_deref().unwrap_or("<end>"),
                count = ids.len(),
                "appended batch"
            );
            report.batches.push(AppendedBatch {
                after: after.clone(),
                count: ids.len(),
            });
            report.blocks_created += ids.len();

            for (request, block_id) in chunk.iter().zip(&ids) {
                if let Some(logical_id) = &request.logical_id {
                    self.ledger.insert(scope_id, logical_id, block_id)?;
                    report
                        .materialized
                        .push((logical_id.clone(), block_id.clone()));
                }
            }
            for (request, block_id) in chunk.iter().zip(&ids) {
                if let Err(err) = self.append_children(block_id, &request.children, report) {
                    self.abandon(scope_id, request, block_id);
                    return Err(err);
                }
            }

            last = ids.last().cloned();
            if anchored {
                after = last.clone();
            }
        }
        Ok(last)
    }

    fn append_children(
        &self,
        parent_id: &str,
        children: &[BlockPayload],
        report: &mut FlushReport,
    ) -> Result<()> {
        for chunk in children.chunks(self.max_batch) {
            let ids = self.destination.append_children(parent_id, chunk)?;
            report.append_calls += 1;
            check_count(chunk.len(), ids.len())?;
            report.blocks_created += ids.len();
        }
        Ok(())
    }

    /// Forget and delete a block left without its children. When the ledger
    /// entry cannot be dropped the block stays, so it is never written twice.
    fn abandon(&self, scope_id: &str, request: &InsertionRequest, block_id: &str) {
        if let Some(logical_id) = &request.logical_id {
            if let Err(err) = self.ledger.delete_entry(scope_id, logical_id) {
                tracing::error!(
                    scope_id,
                    logical_id = %logical_id,
                    block_id,
                    error = %err,
                    "block is missing children and stays recorded"
                );
                return;
            }
        }
        match self.destination.delete_block(block_id) {
            Ok(()) => tracing::warn!(scope_id, block_id, "deleted block whose children failed"),
            Err(err) => tracing::error!(
                scope_id,
                block_id,
                error = %err,
                "could not delete block whose children failed"
            ),
        }
    }
}

fn check_count(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        tracing::error!(expected, actual, "destination returned a mismatched id count");
        return Err(SyncError::BatchMismatch { expected, actual });
    }
    Ok(())
}
