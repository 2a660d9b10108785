// ==========================================
// 批量导入与回滚账本 - 回滚服务
// ==========================================
// 职责: 以补偿操作逆转一个 completed 批次
// 流程: 校验状态 → 逆序遍历变更记录 → create 删除 / update 恢复 prior_state
//       → 标记 rolled_back → 审计
// 红线: 回滚是一个整体（单事务），要么全部逆转，要么全部不动
// 红线: 行结果与变更记录保留为历史，不修改
// ==========================================

use crate::config::ImportConfigReader;
use crate::db::SharedConnection;
use crate::domain::audit::{AuditAction, AuditEntry};
use crate::domain::entity::EntityRef;
use crate::domain::import::{BatchStatus, ChangeOperation, ChangeRecord, ImportBatch};
use crate::domain::rollback::{
    BlockReason, ReviewItem, ReviewReason, RollbackBlocker, RollbackPreview, RollbackResult,
};
use crate::domain::schema::SchemaRegistry;
use crate::importer::BATCH_ENTITY_TYPE;
use crate::ledger::error::{LedgerResult, RollbackError};
use crate::ledger::references::derive_references;
use crate::repository::{
    AuditLogRepository, EntityRepository, ImportBatchRepository, RepositoryError, RepositoryResult,
};
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, MutexGuard};
use tracing::{info, instrument, warn};

// ==========================================
// RollbackService - 回滚服务
// ==========================================
pub struct RollbackService<C>
where
    C: ImportConfigReader,
{
    conn: SharedConnection,
    registry: Arc<SchemaRegistry>,
    config: C,
}

/// 单次逆转过程的累计结果
#[derive(Default)]
struct Reversal {
    reversed: usize,
    deleted: usize,
    restored: usize,
    blockers: Vec<RollbackBlocker>,
    review_items: Vec<ReviewItem>,
}

impl<C> RollbackService<C>
where
    C: ImportConfigReader,
{
    pub fn new(conn: SharedConnection, registry: Arc<SchemaRegistry>, config: C) -> Self {
        Self {
            conn,
            registry,
            config,
        }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 回滚一个导入批次
    ///
    /// # 参数
    /// - batch_id: 批次 ID
    /// - actor_id: 操作人
    ///
    /// # 返回
    /// - Ok(RollbackResult): 已逆转，批次为 rolled_back
    /// - Err(NotRollbackEligible): 批次非 completed（failed / 已回滚）
    /// - Err(Unsafe): 存在阻塞实体，整体中止，批次保持 completed
    #[instrument(skip(self), fields(batch_id = %batch_id, actor_id = %actor_id))]
    pub async fn rollback(&self, batch_id: &str, actor_id: &str) -> LedgerResult<RollbackResult> {
        let allow_degraded = self
            .config
            .get_allow_degraded_rollback()
            .await
            .map_err(|e| RollbackError::ConfigReadError(e.to_string()))?;

        let result = self.rollback_blocking(batch_id, actor_id, allow_degraded);
        match &result {
            Ok(r) => info!(
                reversed = r.reversed,
                deleted = r.deleted,
                restored = r.restored,
                degraded = r.degraded,
                "批次回滚完成"
            ),
            Err(RollbackError::Unsafe { blockers, .. }) => {
                warn!(blockers = blockers.len(), "回滚不安全，已中止")
            }
            Err(e) => warn!(error = %e, "回滚被拒绝"),
        }
        result
    }

    /// 回滚预检：在不提交的事务中演练一次逆转
    pub async fn preview(&self, batch_id: &str) -> LedgerResult<RollbackPreview> {
        let allow_degraded = self
            .config
            .get_allow_degraded_rollback()
            .await
            .map_err(|e| RollbackError::ConfigReadError(e.to_string()))?;

        // 演练中会写入，需提前持有写锁
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (_, changes) = Self::load_eligible(&tx, batch_id)?;
        let reversal = self.reverse_changes(&tx, batch_id, &changes, allow_degraded)?;
        // 演练结果不提交
        drop(tx);

        Ok(RollbackPreview {
            batch_id: batch_id.to_string(),
            change_count: changes.len(),
            blockers: reversal.blockers,
            review_items: reversal.review_items,
        })
    }

    fn rollback_blocking(
        &self,
        batch_id: &str,
        actor_id: &str,
        allow_degraded: bool,
    ) -> LedgerResult<RollbackResult> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (batch, changes) = Self::load_eligible(&tx, batch_id)?;
        let reversal = self.reverse_changes(&tx, batch_id, &changes, allow_degraded)?;
        if !reversal.blockers.is_empty() {
            // tx 未提交即丢弃：所有逆转撤销，批次保持 completed
            return Err(RollbackError::Unsafe {
                batch_id: batch_id.to_string(),
                blockers: reversal.blockers,
            });
        }

        let now = Utc::now();
        ImportBatchRepository::mark_rolled_back_tx(&tx, batch_id, actor_id, &now)?;

        let degraded = !reversal.review_items.is_empty();
        let entry = AuditEntry::new(
            actor_id,
            AuditAction::ImportRolledBack,
            BATCH_ENTITY_TYPE,
            Some(batch_id),
            format!(
                "回滚导入 {} ({}): 逆转 {} 条变更，删除 {}，恢复 {}{}",
                batch.file_name,
                batch.domain,
                reversal.reversed,
                reversal.deleted,
                reversal.restored,
                if degraded { "，需人工复核" } else { "" }
            ),
        )
        .with_payload(json!({
            "reversed": reversal.reversed,
            "deleted": reversal.deleted,
            "restored": reversal.restored,
            "degraded": degraded,
            "review_items": reversal.review_items,
        }));
        AuditLogRepository::insert_tx(&tx, &entry)?;

        let batch = ImportBatchRepository::find_batch_tx(&tx, batch_id)?
            .ok_or_else(|| RollbackError::BatchNotFound(batch_id.to_string()))?;
        tx.commit()?;

        Ok(RollbackResult {
            batch,
            reversed: reversal.reversed,
            deleted: reversal.deleted,
            restored: reversal.restored,
            degraded,
            review_items: reversal.review_items,
        })
    }

    /// 读取批次并校验可回滚
    fn load_eligible(
        conn: &Connection,
        batch_id: &str,
    ) -> LedgerResult<(ImportBatch, Vec<ChangeRecord>)> {
        let batch = ImportBatchRepository::find_batch_tx(conn, batch_id)?
            .ok_or_else(|| RollbackError::BatchNotFound(batch_id.to_string()))?;
        if !batch.status.can_transition_to(BatchStatus::RolledBack) {
            return Err(RollbackError::NotRollbackEligible {
                batch_id: batch_id.to_string(),
                status: batch.status,
            });
        }
        let changes = ImportBatchRepository::list_changes_tx(conn, batch_id)?;
        Ok((batch, changes))
    }

    /// 逆序逆转变更记录（在调用方事务内，是否提交由调用方决定）
    fn reverse_changes(
        &self,
        conn: &Connection,
        batch_id: &str,
        changes: &[ChangeRecord],
        allow_degraded: bool,
    ) -> LedgerResult<Reversal> {
        let mut reversal = Reversal::default();
        // 逆序首次访问的即为本批次对该实体的最后一次变更
        let mut visited: HashSet<EntityRef> = HashSet::new();
        let now = Utc::now();

        for change in changes.iter().rev() {
            let entity = EntityRef::new(&change.entity_type, &change.entity_id);
            let current = EntityRepository::find_tx(conn, &change.entity_type, &change.entity_id)?;

            let Some(current) = current else {
                if visited.insert(entity.clone()) {
                    reversal.blockers.push(RollbackBlocker {
                        entity,
                        reason: BlockReason::EntityMissing,
                    });
                }
                continue;
            };

            // ===== 降级检测 =====
            if visited.insert(entity.clone()) {
                let later = ImportBatchRepository::later_completed_batches_tx(
                    conn,
                    &change.entity_type,
                    &change.entity_id,
                    change.change_seq,
                    batch_id,
                )?;
                let review = if !later.is_empty() {
                    Some(ReviewReason::LaterBatch { batch_ids: later })
                } else if current.revision != change.revision_after {
                    Some(ReviewReason::ModifiedSinceImport {
                        expected_revision: change.revision_after,
                        actual_revision: current.revision,
                    })
                } else {
                    None
                };

                if let Some(reason) = review {
                    if allow_degraded {
                        reversal.review_items.push(ReviewItem {
                            entity: entity.clone(),
                            reason,
                        });
                    } else {
                        reversal.blockers.push(RollbackBlocker {
                            entity: entity.clone(),
                            reason: BlockReason::Degraded { reason },
                        });
                    }
                }
            }

            // ===== 逆转 =====
            match (change.operation, &change.prior_state) {
                (ChangeOperation::Create, _) => {
                    // 自引用不算外部依赖
                    let dependents: Vec<EntityRef> = EntityRepository::find_dependents_tx(
                        conn,
                        &change.entity_type,
                        &change.entity_id,
                    )?
                    .iter()
                    .map(|d| EntityRef::new(&d.source_type, &d.source_id))
                    .filter(|d| *d != entity)
                    .collect();
                    if !dependents.is_empty() {
                        reversal.blockers.push(RollbackBlocker {
                            entity,
                            reason: BlockReason::ReferencedBy { dependents },
                        });
                        continue;
                    }
                    EntityRepository::delete_tx(conn, &change.entity_type, &change.entity_id)?;
                    reversal.deleted += 1;
                }
                (ChangeOperation::Update, Some(prior)) => {
                    let schema = self.registry.by_entity_type(&change.entity_type)?;
                    let payload = serde_json::from_str(prior).map_err(RepositoryError::from)?;
                    let references =
                        derive_references(schema, &self.registry, &change.entity_id, &payload)?;

                    // 导入前快照引用的实体必须仍然存在
                    let mut targets = Vec::new();
                    for reference in &references {
                        let target = EntityRef::new(&reference.target_type, &reference.target_id);
                        if target == entity {
                            continue;
                        }
                        if EntityRepository::find_tx(conn, &target.entity_type, &target.entity_id)?
                            .is_none()
                        {
                            targets.push(target);
                        }
                    }
                    if !targets.is_empty() {
                        reversal.blockers.push(RollbackBlocker {
                            entity,
                            reason: BlockReason::ReferenceMissing { targets },
                        });
                        continue;
                    }

                    // 逐字节恢复（后写者胜，不做合并）
                    EntityRepository::update_tx(
                        conn,
                        &change.entity_type,
                        &change.entity_id,
                        prior,
                        current.revision,
                        None,
                        &now,
                    )?;
                    EntityRepository::replace_references_tx(
                        conn,
                        &change.entity_type,
                        &change.entity_id,
                        &references,
                    )?;
                    reversal.restored += 1;
                }
                (ChangeOperation::Update, None) => {
                    return Err(RepositoryError::CorruptRecord {
                        field: "prior_state_json".to_string(),
                        message: format!("update 变更缺少 prior_state: {}", entity),
                    }
                    .into());
                }
            }
            reversal.reversed += 1;
        }

        Ok(reversal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use crate::db::open_in_memory_shared;
    use crate::domain::import::{CellValue, RawRow};
    use crate::domain::mapping::ColumnMapping;
    use crate::domain::schema::ImportDomain;
    use crate::importer::{BatchImporter, BatchImporterImpl, ImportRequest};

    fn row(code: &str, name: &str, price: &str) -> RawRow {
        [
            ("code".to_string(), CellValue::from(code)),
            ("name".to_string(), CellValue::from(name)),
            ("price".to_string(), CellValue::from(price)),
        ]
        .into_iter()
        .collect()
    }

    fn request(rows: Vec<RawRow>) -> ImportRequest {
        ImportRequest {
            domain: ImportDomain::Products,
            file_name: "products.csv".to_string(),
            rows,
            mappings: vec![
                ColumnMapping::matched("code", "code"),
                ColumnMapping::matched("name", "name"),
                ColumnMapping::matched("price", "price"),
            ],
            actor_id: "alice".to_string(),
        }
    }

    fn setup() -> (
        SharedConnection,
        BatchImporterImpl<ConfigManager>,
        RollbackService<ConfigManager>,
    ) {
        let shared = open_in_memory_shared().unwrap();
        let registry = Arc::new(SchemaRegistry::builtin().unwrap());
        let importer = BatchImporterImpl::new(
            shared.clone(),
            registry.clone(),
            ConfigManager::from_connection(shared.clone()).unwrap(),
        );
        let service = RollbackService::new(
            shared.clone(),
            registry,
            ConfigManager::from_connection(shared.clone()).unwrap(),
        );
        (shared, importer, service)
    }

    #[tokio::test]
    async fn test_rollback_restores_prior_state_then_deletes_created() {
        let (shared, importer, service) = setup();
        let repo = EntityRepository::new(shared.clone());

        let first = importer
            .execute(request(vec![row("A", "Apple", "1.00"), row("B", "Banana", "2.00")]))
            .await
            .unwrap();
        let before = repo.find("product", "A").unwrap().unwrap().payload_json;

        let second = importer
            .execute(request(vec![row("A", "Apricot", "3.00")]))
            .await
            .unwrap();
        assert_eq!(second.status, BatchStatus::Completed);

        let result = service.rollback(&second.batch_id, "bob").await.unwrap();
        assert_eq!(result.batch.status, BatchStatus::RolledBack);
        assert_eq!(result.batch.rolled_back_by.as_deref(), Some("bob"));
        assert_eq!((result.reversed, result.restored, result.deleted), (1, 1, 0));
        assert!(!result.degraded);
        assert_eq!(repo.find("product", "A").unwrap().unwrap().payload_json, before);

        let result = service.rollback(&first.batch_id, "bob").await.unwrap();
        assert_eq!(result.deleted, 2);
        assert!(repo.find("product", "A").unwrap().is_none());
        assert!(repo.find("product", "B").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rollback_twice_is_not_eligible() {
        let (_, importer, service) = setup();
        let batch = importer.execute(request(vec![row("A", "Apple", "1")])).await.unwrap();

        service.rollback(&batch.batch_id, "bob").await.unwrap();
        let again = service.rollback(&batch.batch_id, "bob").await;
        assert!(matches!(
            again,
            Err(RollbackError::NotRollbackEligible {
                status: BatchStatus::RolledBack,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_failed_batch_not_eligible_and_missing_batch() {
        let (_, importer, service) = setup();
        let batch = importer.execute(request(vec![row("A", "", "x")])).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Failed);

        assert!(matches!(
            service.rollback(&batch.batch_id, "bob").await,
            Err(RollbackError::NotRollbackEligible { .. })
        ));
        assert!(matches!(
            service.preview("nope").await,
            Err(RollbackError::BatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_preview_does_not_change_state() {
        let (shared, importer, service) = setup();
        let batch = importer.execute(request(vec![row("A", "Apple", "1")])).await.unwrap();

        let preview = service.preview(&batch.batch_id).await.unwrap();
        assert!(preview.is_safe());
        assert_eq!(preview.change_count, 1);

        let repo = EntityRepository::new(shared.clone());
        assert!(repo.find("product", "A").unwrap().is_some());
        let batch = ImportBatchRepository::new(shared).find_batch(&batch.batch_id).unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
    }
}
