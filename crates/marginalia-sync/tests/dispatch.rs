//! Batch dispatcher against a recording destination

mod common;

use common::{paragraph, Call, ChildFault, FailingLedger, RecordingDestination};
use marginalia_sync::{
    BatchDispatcher, Destination, FileLedger, InsertionRequest, Ledger, SyncError, TransportError,
};
use tempfile::tempdir;

fn requests(anchor: Option<&str>, range: std::ops::Range<usize>) -> Vec<InsertionRequest> {
    range
        .map(|i| {
            InsertionRequest::tracked(
                anchor.map(str::to_string),
                format!("bm-{i}"),
                paragraph(&format!("item {i}")),
            )
        })
        .collect()
}

/// A page holding a single "start" block, returned with its id.
fn page_with_start(destination: &RecordingDestination) -> (String, String) {
    let page = destination
        .ensure_page(&common::properties(&common::book("book", 1)))
        .unwrap();
    let ids = destination
        .store
        .append_after(&page.page_id, None, &[paragraph("start")])
        .unwrap();
    (page.page_id, ids[0].clone())
}

#[test]
fn test_single_anchor_run_is_chunked_in_order() {
    let dir = tempdir().unwrap();
    let ledger = FileLedger::open(dir.path().join("sync.ledger")).unwrap();
    let destination = RecordingDestination::new();
    let (page_id, start) = page_with_start(&destination);

    let batch = requests(Some(start.as_str()), 0..250);
    let report = BatchDispatcher::new(&destination, &ledger, 100)
        .flush(&page_id, "book", &batch)
        .unwrap();

    assert_eq!(destination.append_sizes(), vec![100, 100, 50]);
    assert_eq!(report.append_calls, 3);
    assert_eq!(report.materialized.len(), 250);

    // Later chunks continue after the previous chunk's last block
    let calls = destination.calls();
    assert_eq!(
        calls[0],
        Call::AppendAfter {
            after: Some(start.clone()),
            count: 100
        }
    );
    assert_eq!(
        calls[1],
        Call::AppendAfter {
            after: Some(report.materialized[99].1.clone()),
            count: 100
        }
    );

    let outline = common::outline(&destination.store, "book");
    let expected: Vec<String> = std::iter::once("start".to_string())
        .chain((0..250).map(|i| format!("item {i}")))
        .collect();
    assert_eq!(outline, expected);

    for (i, (logical, block_id)) in report.materialized.iter().enumerate() {
        assert_eq!(logical, &format!("bm-{i}"));
        assert_eq!(
            ledger.lookup_by_logical("book", logical).unwrap().as_ref(),
            Some(block_id)
        );
    }
}

#[test]
fn test_unanchored_requests_append_at_the_end() {
    let dir = tempdir().unwrap();
    let ledger = FileLedger::open(dir.path().join("sync.ledger")).unwrap();
    let destination = RecordingDestination::new();
    let (page_id, _) = page_with_start(&destination);

    let mut batch = requests(None, 0..3);
    batch.insert(0, InsertionRequest::structural(None, paragraph("divider")));
    let report = BatchDispatcher::new(&destination, &ledger, 2)
        .flush(&page_id, "book", &batch)
        .unwrap();

    assert_eq!(destination.append_sizes(), vec![2, 2]);
    assert!(destination
        .calls()
        .iter()
        .all(|c| matches!(c, Call::AppendAfter { after: None, .. })));
    assert_eq!(
        common::outline(&destination.store, "book"),
        vec!["start", "divider", "item 0", "item 1", "item 2"]
    );
    // Structural blocks are never recorded
    assert_eq!(report.materialized.len(), 3);
    assert_eq!(ledger.entries("book").unwrap().len(), 3);
}

#[test]
fn test_runs_sharing_an_anchor_stay_in_request_order() {
    let dir = tempdir().unwrap();
    let ledger = FileLedger::open(dir.path().join("sync.ledger")).unwrap();
    let destination = RecordingDestination::new();
    let (page_id, start) = page_with_start(&destination);
    let end = destination
        .store
        .append_after(&page_id, None, &[paragraph("end")])
        .unwrap()
        .remove(0);

    let mut batch = requests(Some(start.as_str()), 0..2);
    batch.extend(requests(Some(end.as_str()), 2..3));
    batch.extend(requests(Some(start.as_str()), 3..4));

    BatchDispatcher::new(&destination, &ledger, 100)
        .flush(&page_id, "book", &batch)
        .unwrap();

    assert_eq!(
        common::outline(&destination.store, "book"),
        vec!["start", "item 0", "item 1", "item 3", "end", "item 2"]
    );
}

#[test]
fn test_children_are_chunked_under_their_parent() {
    let dir = tempdir().unwrap();
    let ledger = FileLedger::open(dir.path().join("sync.ledger")).unwrap();
    let destination = RecordingDestination::new();
    let (page_id, _) = page_with_start(&destination);

    let children = (0..150).map(|i| paragraph(&format!("row {i}"))).collect();
    let batch = vec![InsertionRequest::tracked(None, "_stat.detail_", paragraph("table"))
        .with_children(children)];
    let report = BatchDispatcher::new(&destination, &ledger, 100)
        .flush(&page_id, "book", &batch)
        .unwrap();

    let parent = report.materialized[0].1.clone();
    let child_calls: Vec<Call> = destination
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::AppendChildren { .. }))
        .collect();
    assert_eq!(
        child_calls,
        vec![
            Call::AppendChildren {
                parent: parent.clone(),
                count: 100
            },
            Call::AppendChildren { parent, count: 50 },
        ]
    );
    assert_eq!(report.blocks_created, 151);
    let page = destination.store.page_for("book").unwrap();
    assert_eq!(page.blocks[1].children.len(), 150);
}

#[test]
fn test_batch_mismatch_keeps_earlier_chunks_only() {
    let dir = tempdir().unwrap();
    let ledger = FileLedger::open(dir.path().join("sync.ledger")).unwrap();
    let destination = RecordingDestination::shortchanging(2);
    let (page_id, start) = page_with_start(&destination);

    let batch = requests(Some(start.as_str()), 0..250);
    let err = BatchDispatcher::new(&destination, &ledger, 100)
        .flush(&page_id, "book", &batch)
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::BatchMismatch {
            expected: 100,
            actual: 99
        }
    ));
    // The third chunk is never sent
    assert_eq!(destination.append_sizes(), vec![100, 100]);

    let recorded = ledger.entries("book").unwrap();
    assert_eq!(recorded.len(), 100);
    assert!(recorded
        .iter()
        .all(|e| e.logical_id.trim_start_matches("bm-").parse::<usize>().unwrap() < 100));
    assert_eq!(ledger.lookup_by_logical("book", "bm-100").unwrap(), None);
}

#[test]
fn test_ledger_failure_aborts_immediately() {
    let dir = tempdir().unwrap();
    let inner = FileLedger::open(dir.path().join("sync.ledger")).unwrap();
    let ledger = FailingLedger::new(inner, 10);
    let destination = RecordingDestination::new();
    let (page_id, start) = page_with_start(&destination);

    let batch = requests(Some(start.as_str()), 0..250);
    let err = BatchDispatcher::new(&destination, &ledger, 100)
        .flush(&page_id, "book", &batch)
        .unwrap_err();

    assert!(matches!(err, SyncError::Ledger(_)));
    assert_eq!(destination.append_sizes(), vec![100]);
    assert_eq!(ledger.entries("book").unwrap().len(), 10);
}

#[test]
fn test_rejected_children_keep_chunk_siblings_recorded() {
    let dir = tempdir().unwrap();
    let ledger = FileLedger::open(dir.path().join("sync.ledger")).unwrap();
    let destination = RecordingDestination::with_child_fault(ChildFault::Reject);
    let (page_id, start) = page_with_start(&destination);

    let mut batch = requests(Some(start.as_str()), 0..3);
    batch[1] = batch[1].clone().with_children(vec![paragraph("note")]);
    let err = BatchDispatcher::new(&destination, &ledger, 100)
        .flush(&page_id, "book", &batch)
        .unwrap_err();

    assert!(matches!(err, SyncError::Transport(TransportError::Rejected(_))));
    // Siblings in the same chunk landed and stay recorded
    assert!(ledger.lookup_by_logical("book", "bm-0").unwrap().is_some());
    assert!(ledger.lookup_by_logical("book", "bm-2").unwrap().is_some());
    // The block without its children is gone, so a retry writes it whole
    assert_eq!(ledger.lookup_by_logical("book", "bm-1").unwrap(), None);
    assert_eq!(
        common::outline(&destination.store, "book"),
        vec!["start", "item 0", "item 2"]
    );
    assert!(destination
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Delete { .. })));
}

#[test]
fn test_children_id_mismatch_is_an_error() {
    let dir = tempdir().unwrap();
    let ledger = FileLedger::open(dir.path().join("sync.ledger")).unwrap();
    let destination = RecordingDestination::with_child_fault(ChildFault::Shortchange);
    let (page_id, _) = page_with_start(&destination);

    let children = vec![paragraph("row 0"), paragraph("row 1")];
    let batch = vec![InsertionRequest::tracked(None, "_stat.total_", paragraph("table"))
        .with_children(children)];
    let err = BatchDispatcher::new(&destination, &ledger, 100)
        .flush(&page_id, "book", &batch)
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::BatchMismatch {
            expected: 2,
            actual: 1
        }
    ));
    assert!(ledger.entries("book").unwrap().is_empty());
    assert_eq!(common::outline(&destination.store, "book"), vec!["start"]);
}
