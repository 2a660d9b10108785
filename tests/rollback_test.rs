// ==========================================
// 回滚集成测试
// ==========================================
// 测试目标: 补偿式回滚、阻塞实体、降级复核、整体性（不部分提交）
// ==========================================

mod helpers;

use helpers::mock_config::MockConfig;
use import_ledger::api::ApiError;
use import_ledger::config::config_keys;
use import_ledger::domain::audit::AuditFilter;
use import_ledger::domain::entity::EntityRef;
use import_ledger::domain::import::{BatchStatus, CellValue, RawRow};
use import_ledger::domain::rollback::{BlockReason, ReviewReason};
use import_ledger::domain::schema::ImportDomain;
use import_ledger::domain::types::PageRequest;
use import_ledger::ledger::{RollbackError, RollbackService};
use import_ledger::logging;
use serde_json::json;
use test_helpers::*;

fn stock_of(ctx: &TestContext, code: &str) -> serde_json::Value {
    payload_field(&ctx.entity_api, ImportDomain::Products, code, "stock")
}

fn batch_status(ctx: &TestContext, batch_id: &str) -> BatchStatus {
    ctx.import_api.batch_detail(batch_id).unwrap().batch.status
}

/// SKU-9: 10 → 50（待回滚批次）→ 60（无关的后续批次）
async fn import_stock_history(ctx: &TestContext) -> (String, String, String) {
    let mut ids = Vec::new();
    for (file, stock) in [("seed.csv", "10"), ("restock.csv", "50"), ("recount.csv", "60")] {
        let batch = ctx
            .import_api
            .execute(products_request(file, "alice", &[&["SKU-9", "Widget", "4", stock]]))
            .await
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        ids.push(batch.batch_id);
    }
    (ids[0].clone(), ids[1].clone(), ids[2].clone())
}

// ==========================================
// 正常回滚
// ==========================================

#[tokio::test]
async fn test_rollback_deletes_created_entity() {
    logging::init_test();
    let ctx = setup();

    let batch = ctx
        .import_api
        .execute(products_request("new.csv", "alice", &[&["SKU-9", "Widget", "4", "10"]]))
        .await
        .unwrap();

    let result = ctx.import_api.rollback(&batch.batch_id, "bob").await.unwrap();
    assert_eq!(result.batch.status, BatchStatus::RolledBack);
    assert_eq!(result.batch.rolled_back_by.as_deref(), Some("bob"));
    assert!(result.batch.rolled_back_at.is_some());
    assert_eq!((result.reversed, result.deleted, result.restored), (1, 1, 0));
    assert!(ctx.entity_api.get(ImportDomain::Products, "SKU-9").unwrap().is_none());

    // 行结果与变更记录作为历史保留
    let detail = ctx.import_api.batch_detail(&batch.batch_id).unwrap();
    assert_eq!(detail.outcomes.len(), 1);
    assert_eq!(detail.changes.len(), 1);

    let audit = ctx
        .import_api
        .list_audit(
            &AuditFilter {
                entity_id: Some(batch.batch_id.clone()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    let actions: Vec<&str> = audit.items.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["IMPORT_ROLLED_BACK", "IMPORT_EXECUTED"]);
    assert_eq!(audit.items[0].actor_id, "bob");
    assert_eq!(audit.items[0].payload_json.as_ref().unwrap()["deleted"], json!(1));
}

#[tokio::test]
async fn test_rollback_restores_prior_state_despite_later_write() {
    logging::init_test();
    let ctx = setup();
    let (_, restock, recount) = import_stock_history(&ctx).await;

    let change = &ctx.import_api.batch_detail(&restock).unwrap().changes[0];
    let prior: serde_json::Value = serde_json::from_str(change.prior_state.as_deref().unwrap()).unwrap();
    assert_eq!(prior["stock"], json!(10));
    assert_eq!(stock_of(&ctx, "SKU-9"), json!(60));

    let result = ctx.import_api.rollback(&restock, "bob").await.unwrap();
    assert_eq!(result.restored, 1);
    assert_eq!(stock_of(&ctx, "SKU-9"), json!(10));

    // 后续批次的修改被覆盖，标记为需人工复核
    assert!(result.degraded);
    assert_eq!(result.review_items.len(), 1);
    assert_eq!(result.review_items[0].entity, EntityRef::new("product", "SKU-9"));
    assert_eq!(
        result.review_items[0].reason,
        ReviewReason::LaterBatch {
            batch_ids: vec![recount.clone()]
        }
    );
    assert_eq!(batch_status(&ctx, &recount), BatchStatus::Completed);
}

#[tokio::test]
async fn test_update_rollback_restores_references() {
    logging::init_test();
    let ctx = setup();
    let headers = ["code", "name", "price", "parent_code"];

    ctx.import_api
        .execute(request(
            ImportDomain::Products,
            "parents.csv",
            "alice",
            &headers,
            &[&["P-1", "Root", "1", ""], &["P-2", "Other", "1", ""], &["X", "Leaf", "1", "P-1"]],
        ))
        .await
        .unwrap();
    let moved = ctx
        .import_api
        .execute(request(
            ImportDomain::Products,
            "move.csv",
            "alice",
            &headers,
            &[&["X", "Leaf", "1", "P-2"]],
        ))
        .await
        .unwrap();

    ctx.import_api.rollback(&moved.batch_id, "bob").await.unwrap();
    assert_eq!(
        payload_field(&ctx.entity_api, ImportDomain::Products, "X", "parent_code"),
        json!("P-1")
    );

    // 引用关系随快照一起恢复
    assert!(matches!(
        ctx.entity_api.delete(ImportDomain::Products, "bob", "P-1"),
        Err(ApiError::BusinessRuleViolation(_))
    ));
    ctx.entity_api.delete(ImportDomain::Products, "bob", "P-2").unwrap();
}

// ==========================================
// 不可回滚
// ==========================================

#[tokio::test]
async fn test_double_rollback_rejected() {
    logging::init_test();
    let ctx = setup();

    let batch = ctx
        .import_api
        .execute(products_request("new.csv", "alice", &[&["A", "Apple", "1", "1"]]))
        .await
        .unwrap();
    ctx.import_api.rollback(&batch.batch_id, "bob").await.unwrap();

    let again = ctx.import_api.rollback(&batch.batch_id, "bob").await;
    match again {
        Err(ApiError::NotRollbackEligible { batch_id, status }) => {
            assert_eq!(batch_id, batch.batch_id);
            assert_eq!(status, "rolled_back");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(matches!(
        ctx.import_api.rollback("missing-batch", "bob").await,
        Err(ApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_rollback_blocked_by_referencing_record() {
    logging::init_test();
    let ctx = setup();

    let products = ctx
        .import_api
        .execute(products_request("products.csv", "alice", &[&["P-1", "Pipe", "3", "8"]]))
        .await
        .unwrap();
    let guides = ctx
        .import_api
        .execute(guides_request("guides.csv", "alice", &[&["G-1", "2026-03-01", "P-1", "2"]]))
        .await
        .unwrap();

    let preview = ctx.import_api.preview_rollback(&products.batch_id).await.unwrap();
    assert!(!preview.is_safe());

    let result = ctx.import_api.rollback(&products.batch_id, "bob").await;
    let blockers = match result {
        Err(ApiError::RollbackUnsafe { blockers, .. }) => blockers,
        other => panic!("unexpected result: {:?}", other),
    };
    assert_eq!(blockers, preview.blockers);
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].entity, EntityRef::new("product", "P-1"));
    assert_eq!(
        blockers[0].reason,
        BlockReason::ReferencedBy {
            dependents: vec![EntityRef::new("delivery_guide", "G-1")]
        }
    );

    // 中止后批次保持 completed，实体不动
    assert_eq!(batch_status(&ctx, &products.batch_id), BatchStatus::Completed);
    assert!(ctx.entity_api.get(ImportDomain::Products, "P-1").unwrap().is_some());

    // 先回滚依赖方，再回滚被依赖方
    ctx.import_api.rollback(&guides.batch_id, "bob").await.unwrap();
    let result = ctx.import_api.rollback(&products.batch_id, "bob").await.unwrap();
    assert_eq!(result.deleted, 1);
}

#[tokio::test]
async fn test_missing_entity_blocks_whole_rollback() {
    logging::init_test();
    let ctx = setup();

    let batch = ctx
        .import_api
        .execute(products_request(
            "pair.csv",
            "alice",
            &[&["A", "Apple", "1", "1"], &["B", "Banana", "1", "1"]],
        ))
        .await
        .unwrap();
    ctx.entity_api.delete(ImportDomain::Products, "carol", "A").unwrap();

    let result = ctx.import_api.rollback(&batch.batch_id, "bob").await;
    let blockers = match result {
        Err(ApiError::RollbackUnsafe { blockers, .. }) => blockers,
        other => panic!("unexpected result: {:?}", other),
    };
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].entity, EntityRef::new("product", "A"));
    assert_eq!(blockers[0].reason, BlockReason::EntityMissing);

    // 不部分提交：B 的删除也被撤销
    assert!(ctx.entity_api.get(ImportDomain::Products, "B").unwrap().is_some());
    assert_eq!(batch_status(&ctx, &batch.batch_id), BatchStatus::Completed);
}

#[tokio::test]
async fn test_restoring_reference_to_deleted_entity_blocks_rollback() {
    logging::init_test();
    let ctx = setup();
    let headers = ["code", "name", "price", "parent_code"];

    ctx.import_api
        .execute(request(
            ImportDomain::Products,
            "parents.csv",
            "alice",
            &headers,
            &[&["P-1", "Root", "1", ""], &["P-2", "Other", "1", ""], &["X", "Leaf", "1", "P-1"]],
        ))
        .await
        .unwrap();
    let moved = ctx
        .import_api
        .execute(request(
            ImportDomain::Products,
            "move.csv",
            "alice",
            &headers,
            &[&["X", "Leaf", "1", "P-2"]],
        ))
        .await
        .unwrap();

    // X 已改挂 P-2，P-1 无人引用，可删除
    ctx.entity_api.delete(ImportDomain::Products, "carol", "P-1").unwrap();

    let preview = ctx.import_api.preview_rollback(&moved.batch_id).await.unwrap();
    assert!(!preview.is_safe());

    let blockers = match ctx.import_api.rollback(&moved.batch_id, "bob").await {
        Err(ApiError::RollbackUnsafe { blockers, .. }) => blockers,
        other => panic!("unexpected result: {:?}", other),
    };
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].entity, EntityRef::new("product", "X"));
    assert_eq!(
        blockers[0].reason,
        BlockReason::ReferenceMissing {
            targets: vec![EntityRef::new("product", "P-1")]
        }
    );
    assert_eq!(preview.blockers, blockers);

    // 快照与引用均保持回滚前状态
    assert_eq!(
        payload_field(&ctx.entity_api, ImportDomain::Products, "X", "parent_code"),
        json!("P-2")
    );
    assert!(matches!(
        ctx.entity_api.delete(ImportDomain::Products, "bob", "P-2"),
        Err(ApiError::BusinessRuleViolation(_))
    ));
    assert_eq!(batch_status(&ctx, &moved.batch_id), BatchStatus::Completed);
}

// ==========================================
// 降级复核
// ==========================================

#[tokio::test]
async fn test_strict_config_turns_review_items_into_blockers() {
    logging::init_test();
    let ctx = setup();
    let (_, restock, recount) = import_stock_history(&ctx).await;

    let service = RollbackService::new(ctx.conn.clone(), ctx.registry.clone(), MockConfig::strict_rollback());
    let result = service.rollback(&restock, "bob").await;
    let blockers = match result {
        Err(RollbackError::Unsafe { blockers, .. }) => blockers,
        other => panic!("unexpected result: {:?}", other),
    };
    assert_eq!(
        blockers[0].reason,
        BlockReason::Degraded {
            reason: ReviewReason::LaterBatch {
                batch_ids: vec![recount]
            }
        }
    );
    assert_eq!(stock_of(&ctx, "SKU-9"), json!(60));
    assert_eq!(batch_status(&ctx, &restock), BatchStatus::Completed);

    // 同一策略可由持久化配置开启
    ctx.import_api
        .config()
        .set_config_value(config_keys::ALLOW_DEGRADED_ROLLBACK, "false")
        .unwrap();
    assert!(matches!(
        ctx.import_api.rollback(&restock, "bob").await,
        Err(ApiError::RollbackUnsafe { .. })
    ));
}

#[tokio::test]
async fn test_rolled_back_later_batch_reports_revision_drift() {
    logging::init_test();
    let ctx = setup();

    let seed = ctx
        .import_api
        .execute(products_request("seed.csv", "alice", &[&["SKU-9", "Widget", "4", "10"]]))
        .await
        .unwrap();
    let restock = ctx
        .import_api
        .execute(products_request("restock.csv", "alice", &[&["SKU-9", "Widget", "4", "50"]]))
        .await
        .unwrap();
    ctx.import_api.rollback(&restock.batch_id, "bob").await.unwrap();

    let result = ctx.import_api.rollback(&seed.batch_id, "bob").await.unwrap();
    assert!(result.degraded);
    assert_eq!(
        result.review_items[0].reason,
        ReviewReason::ModifiedSinceImport {
            expected_revision: 1,
            actual_revision: 3,
        }
    );
    assert!(ctx.entity_api.get(ImportDomain::Products, "SKU-9").unwrap().is_none());
}

#[tokio::test]
async fn test_manual_edit_after_import_is_review_item() {
    logging::init_test();
    let ctx = setup();

    let batch = ctx
        .import_api
        .execute(products_request("seed.csv", "alice", &[&["A", "Apple", "1", "10"]]))
        .await
        .unwrap();

    let values: RawRow = [("stock".to_string(), CellValue::from("7"))].into_iter().collect();
    ctx.entity_api
        .update(ImportDomain::Products, "carol", "A", &values, Some(1))
        .unwrap();

    let preview = ctx.import_api.preview_rollback(&batch.batch_id).await.unwrap();
    assert!(preview.is_safe());
    assert_eq!(preview.review_items.len(), 1);

    let result = ctx.import_api.rollback(&batch.batch_id, "bob").await.unwrap();
    assert_eq!(
        result.review_items[0].reason,
        ReviewReason::ModifiedSinceImport {
            expected_revision: 1,
            actual_revision: 2,
        }
    );
    assert_eq!(result.deleted, 1);
}
