use crate::log::{LedgerLog, LedgerRecord};
use crate::{Ledger, LedgerEntry, LedgerError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-scope entries in insertion order, with first-match indexes.
#[derive(Debug, Default)]
struct ScopeIndex {
    entries: Vec<LedgerEntry>,
    by_logical: HashMap<String, usize>,
    by_materialized: HashMap<String, usize>,
    keys: HashSet<(String, String)>,
}

impl ScopeIndex {
    fn contains(&self, logical_id: &str, materialized_id: &str) -> bool {
        self.keys
            .contains(&(logical_id.to_string(), materialized_id.to_string()))
    }

    fn push(&mut self, entry: LedgerEntry) {
        let idx = self.entries.len();
        self.by_logical
            .entry(entry.logical_id.clone())
            .or_insert(idx);
        self.by_materialized
            .entry(entry.materialized_id.clone())
            .or_insert(idx);
        self.keys
            .insert((entry.logical_id.clone(), entry.materialized_id.clone()));
        self.entries.push(entry);
    }

    /// Drop every entry of `logical_id`; returns how many went away.
    fn remove_logical(&mut self, logical_id: &str) -> usize {
        let before = self.entries.len();
        let kept: Vec<LedgerEntry> = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|e| e.logical_id != logical_id)
            .collect();
        let removed = before - kept.len();

        *self = Self::default();
        for entry in kept {
            self.push(entry);
        }
        removed
    }

    fn by_logical(&self, logical_id: &str) -> Option<&LedgerEntry> {
        self.by_logical.get(logical_id).map(|&i| &self.entries[i])
    }

    fn by_materialized(&self, materialized_id: &str) -> Option<&LedgerEntry> {
        self.by_materialized
            .get(materialized_id)
            .map(|&i| &self.entries[i])
    }
}

/// Ledger backed by an fsync'd append-only log file.
///
/// The whole index lives in memory; the log is only read on open.
pub struct FileLedger {
    log: LedgerLog,
    scopes: RwLock<HashMap<String, ScopeIndex>>,
    /// Records in the log that no longer contribute a live entry
    dead_records: AtomicUsize,
}

impl FileLedger {
    /// Open (or create) the ledger at `path` and replay its log.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let log = LedgerLog::open(path.as_ref())?;
        let mut scopes: HashMap<String, ScopeIndex> = HashMap::new();

        let replayed = log.replay(|record| {
            apply(&mut scopes, record);
        })?;

        let live: usize = scopes.values().map(|s| s.entries.len()).sum();
        tracing::debug!(
            path = %log.path().display(),
            replayed,
            live,
            "ledger opened"
        );

        Ok(Self {
            log,
            scopes: RwLock::new(scopes),
            dead_records: AtomicUsize::new(replayed.saturating_sub(live)),
        })
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    /// Ids of every scope holding at least one entry.
    pub fn scopes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .scopes
            .read()
            .iter()
            .filter(|(_, s)| !s.entries.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of log records that a compaction would drop.
    pub fn dead_records(&self) -> usize {
        self.dead_records.load(Ordering::Relaxed)
    }

    /// Rewrite the log so it holds exactly one insert per live entry.
    pub fn compact(&self) -> Result<usize, LedgerError> {
        let scopes = self.scopes.read();
        let mut scope_ids: Vec<&String> = scopes.keys().collect();
        scope_ids.sort();

        let records: Vec<LedgerRecord> = scope_ids
            .into_iter()
            .flat_map(|id| scopes[id].entries.iter())
            .map(|entry| LedgerRecord::Insert {
                scope_id: entry.scope_id.clone(),
                logical_id: entry.logical_id.clone(),
                materialized_id: entry.materialized_id.clone(),
                recorded_at_ms: entry.recorded_at.timestamp_millis(),
            })
            .collect();

        self.log.rewrite(&records)?;
        let dropped = self.dead_records.swap(0, Ordering::Relaxed);
        tracing::info!(live = records.len(), dropped, "ledger compacted");
        Ok(dropped)
    }
}

/// Apply one record to the index; returns how many log records became dead.
fn apply(scopes: &mut HashMap<String, ScopeIndex>, record: LedgerRecord) -> usize {
    match record {
        LedgerRecord::Insert {
            scope_id,
            logical_id,
            materialized_id,
            recorded_at_ms,
        } => {
            let scope = scopes.entry(scope_id.clone()).or_default();
            if scope.contains(&logical_id, &materialized_id) {
                return 1;
            }
            let recorded_at =
                DateTime::<Utc>::from_timestamp_millis(recorded_at_ms).unwrap_or_default();
            scope.push(LedgerEntry {
                scope_id,
                logical_id,
                materialized_id,
                recorded_at,
            });
            0
        }
        LedgerRecord::DeleteScope { scope_id } => scopes
            .remove(&scope_id)
            .map_or(1, |scope| scope.entries.len() + 1),
        LedgerRecord::DeleteEntry {
            scope_id,
            logical_id,
        } => {
            let Some(scope) = scopes.get_mut(&scope_id) else {
                return 1;
            };
            scope.remove_logical(&logical_id) + 1
        }
    }
}

impl Ledger for FileLedger {
    fn insert(
        &self,
        scope_id: &str,
        logical_id: &str,
        materialized_id: &str,
    ) -> Result<(), LedgerError> {
        let mut scopes = self.scopes.write();
        let present = scopes
            .get(scope_id)
            .is_some_and(|s| s.contains(logical_id, materialized_id));
        if present {
            return Ok(());
        }

        let recorded_at = Utc::now();
        // Persist first: the index only reflects what the log already holds.
        self.log.append(&LedgerRecord::Insert {
            scope_id: scope_id.to_string(),
            logical_id: logical_id.to_string(),
            materialized_id: materialized_id.to_string(),
            recorded_at_ms: recorded_at.timestamp_millis(),
        })?;

        scopes
            .entry(scope_id.to_string())
            .or_default()
            .push(LedgerEntry {
                scope_id: scope_id.to_string(),
                logical_id: logical_id.to_string(),
                materialized_id: materialized_id.to_string(),
                recorded_at,
            });
        Ok(())
    }

    fn lookup_by_logical(
        &self,
        scope_id: &str,
        logical_id: &str,
    ) -> Result<Option<String>, LedgerError> {
        Ok(self
            .scopes
            .read()
            .get(scope_id)
            .and_then(|s| s.by_logical(logical_id))
            .map(|e| e.materialized_id.clone()))
    }

    fn lookup_by_materialized(
        &self,
        scope_id: &str,
        materialized_id: &str,
    ) -> Result<Option<String>, LedgerError> {
        Ok(self
            .scopes
            .read()
            .get(scope_id)
            .and_then(|s| s.by_materialized(materialized_id))
            .map(|e| e.logical_id.clone()))
    }

    fn delete_scope(&self, scope_id: &str) -> Result<(), LedgerError> {
        let mut scopes = self.scopes.write();
        let record = LedgerRecord::DeleteScope {
            scope_id: scope_id.to_string(),
        };
        self.log.append(&record)?;
        self.dead_records
            .fetch_add(apply(&mut scopes, record), Ordering::Relaxed);
        Ok(())
    }

    fn delete_entry(&self, scope_id: &str, logical_id: &str) -> Result<(), LedgerError> {
        let mut scopes = self.scopes.write();
        let record = LedgerRecord::DeleteEntry {
            scope_id: scope_id.to_string(),
            logical_id: logical_id.to_string(),
        };
        self.log.append(&record)?;
        self.dead_records
            .fetch_add(apply(&mut scopes, record), Ordering::Relaxed);
        Ok(())
    }

    fn entries(&self, scope_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .scopes
            .read()
            .get(scope_id)
            .map(|s| s.entries.clone())
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for FileLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLedger")
            .field("path", &self.log.path())
            .field("scopes", &self.scopes.read().len())
            .finish()
    }
}
