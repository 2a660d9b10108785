use super::ImportBatchRepository;
use crate::db::open_in_memory_shared;
use crate::domain::import::{
    BatchStatus, ChangeOperation, ChangeRecord, ImportBatch, RowOutcome, RowOutcomeKind,
};
use crate::domain::schema::ImportDomain;
use crate::domain::types::PageRequest;
use crate::repository::error::RepositoryError;
use chrono::{Duration, Utc};

fn make_batch(batch_id: &str, offset_secs: i64) -> ImportBatch {
    ImportBatch {
        batch_id: batch_id.to_string(),
        domain: ImportDomain::Products,
        file_name: "products.csv".to_string(),
        submitted_by: "user1".to_string(),
        submitted_at: Utc::now() + Duration::seconds(offset_secs),
        status: BatchStatus::Pending,
        total_rows: 2,
        success_rows: 0,
        fail_rows: 0,
        finished_at: None,
        error_message: None,
        rolled_back_at: None,
        rolled_back_by: None,
    }
}

fn make_change(batch_id: &str, sequence: usize, entity_id: &str) -> ChangeRecord {
    ChangeRecord {
        batch_id: batch_id.to_string(),
        sequence,
        change_seq: 0,
        entity_type: "product".to_string(),
        entity_id: entity_id.to_string(),
        operation: ChangeOperation::Create,
        prior_state: None,
        new_state: "{}".to_string(),
        revision_after: 1,
        created_at: Utc::now(),
    }
}

#[test]
fn test_insert_and_finalize_batch() {
    let shared = open_in_memory_shared().unwrap();
    let repo = ImportBatchRepository::new(shared.clone());
    {
        let conn = shared.lock().unwrap();
        ImportBatchRepository::insert_batch_tx(&conn, &make_batch("b1", 0)).unwrap();
        ImportBatchRepository::finalize_batch_tx(
            &conn,
            "b1",
            BatchStatus::Completed,
            1,
            1,
            &Utc::now(),
            None,
        )
        .unwrap();
    }

    let batch = repo.find_batch("b1").unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.success_rows, 1);
    assert_eq!(batch.fail_rows, 1);
    assert!(batch.finished_at.is_some());
}

#[test]
fn test_finalize_twice_is_invalid_transition() {
    let shared = open_in_memory_shared().unwrap();
    let conn = shared.lock().unwrap();
    ImportBatchRepository::insert_batch_tx(&conn, &make_batch("b1", 0)).unwrap();
    ImportBatchRepository::finalize_batch_tx(&conn, "b1", BatchStatus::Failed, 0, 2, &Utc::now(), None)
        .unwrap();

    let result = ImportBatchRepository::finalize_batch_tx(
        &conn,
        "b1",
        BatchStatus::Completed,
        1,
        1,
        &Utc::now(),
        None,
    );
    assert!(matches!(result, Err(RepositoryError::InvalidStateTransition { .. })));
}

#[test]
fn test_mark_rolled_back_requires_completed() {
    let shared = open_in_memory_shared().unwrap();
    let conn = shared.lock().unwrap();
    ImportBatchRepository::insert_batch_tx(&conn, &make_batch("b1", 0)).unwrap();

    let pending = ImportBatchRepository::mark_rolled_back_tx(&conn, "b1", "user1", &Utc::now());
    assert!(matches!(pending, Err(RepositoryError::InvalidStateTransition { .. })));

    let missing = ImportBatchRepository::mark_rolled_back_tx(&conn, "nope", "user1", &Utc::now());
    assert!(matches!(missing, Err(RepositoryError::NotFound { .. })));
}

#[test]
fn test_outcomes_and_changes_keep_order() {
    let shared = open_in_memory_shared().unwrap();
    let repo = ImportBatchRepository::new(shared.clone());
    {
        let conn = shared.lock().unwrap();
        ImportBatchRepository::insert_batch_tx(&conn, &make_batch("b1", 0)).unwrap();
        for (idx, id) in ["SKU-2", "SKU-1"].iter().enumerate() {
            ImportBatchRepository::insert_change_tx(&conn, &make_change("b1", idx, id)).unwrap();
            ImportBatchRepository::insert_outcome_tx(
                &conn,
                &RowOutcome {
                    batch_id: "b1".to_string(),
                    row_index: idx,
                    outcome: RowOutcomeKind::Applied,
                    reason: None,
                    entity_id: Some(id.to_string()),
                },
            )
            .unwrap();
        }
    }

    let changes = repo.list_changes("b1").unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].entity_id, "SKU-2");
    assert!(changes[0].change_seq < changes[1].change_seq);

    let outcomes = repo.list_outcomes("b1").unwrap();
    assert_eq!(outcomes[1].entity_id.as_deref(), Some("SKU-1"));
}

#[test]
fn test_duplicate_row_outcome_rejected() {
    let shared = open_in_memory_shared().unwrap();
    let conn = shared.lock().unwrap();
    ImportBatchRepository::insert_batch_tx(&conn, &make_batch("b1", 0)).unwrap();
    let outcome = RowOutcome {
        batch_id: "b1".to_string(),
        row_index: 0,
        outcome: RowOutcomeKind::Rejected,
        reason: Some("bad".to_string()),
        entity_id: None,
    };
    ImportBatchRepository::insert_outcome_tx(&conn, &outcome).unwrap();
    let dup = ImportBatchRepository::insert_outcome_tx(&conn, &outcome);
    assert!(dup.is_err());
}

#[test]
fn test_list_recent_most_recent_first() {
    let shared = open_in_memory_shared().unwrap();
    let repo = ImportBatchRepository::new(shared.clone());
    {
        let conn = shared.lock().unwrap();
        ImportBatchRepository::insert_batch_tx(&conn, &make_batch("old", -60)).unwrap();
        ImportBatchRepository::insert_batch_tx(&conn, &make_batch("new", 0)).unwrap();
        ImportBatchRepository::insert_batch_tx(&conn, &make_batch("mid", -30)).unwrap();
    }

    let page = repo.list_recent(PageRequest::new(2, 0)).unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(
        page.items.iter().map(|b| b.batch_id.as_str()).collect::<Vec<_>>(),
        vec!["new", "mid"]
    );
}

#[test]
fn test_later_completed_batches() {
    let shared = open_in_memory_shared().unwrap();
    let conn = shared.lock().unwrap();
    ImportBatchRepository::insert_batch_tx(&conn, &make_batch("a", 0)).unwrap();
    ImportBatchRepository::insert_batch_tx(&conn, &make_batch("b", 1)).unwrap();
    let seq_a = ImportBatchRepository::insert_change_tx(&conn, &make_change("a", 0, "SKU-9")).unwrap();
    ImportBatchRepository::insert_change_tx(&conn, &make_change("b", 0, "SKU-9")).unwrap();

    // b 仍是 pending，不计入
    let none = ImportBatchRepository::later_completed_batches_tx(&conn, "product", "SKU-9", seq_a, "a")
        .unwrap();
    assert!(none.is_empty());

    ImportBatchRepository::finalize_batch_tx(&conn, "b", BatchStatus::Completed, 1, 0, &Utc::now(), None)
        .unwrap();
    let later = ImportBatchRepository::later_completed_batches_tx(&conn, "product", "SKU-9", seq_a, "a")
        .unwrap();
    assert_eq!(later, vec!["b".to_string()]);
}
