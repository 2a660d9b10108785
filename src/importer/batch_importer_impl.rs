// ==========================================
// 批量导入与回滚账本 - 批次导入器实现
// ==========================================
// 流程: 前置校验 → 建批次 → 逐行(投影 → 转换 → 校验 → 落库) → 结束批次 → 审计
// 红线: 批次内严格按文件顺序串行（后行可能引用前行创建的自然键）
// 并发: 每行 "读当前状态 → 判定 create/update → 写实体/变更/行结果"
//       在一个 BEGIN IMMEDIATE 事务内完成
// ==========================================

use crate::config::ImportConfigReader;
use crate::db::SharedConnection;
use crate::domain::audit::{AuditAction, AuditEntry};
use crate::domain::entity::EntityReference;
use crate::domain::import::{
    BatchStatus, CanonicalRecord, ChangeOperation, ChangeRecord, FieldValue, ImportBatch,
    RowOutcome, RowOutcomeKind,
};
use crate::domain::mapping::ColumnMapping;
use crate::domain::schema::{DomainSchema, SchemaRegistry};
use crate::importer::batch_importer_trait::{BatchImporter, ImportRequest};
use crate::importer::dq_validator::DqValidator;
use crate::importer::error::{join_row_errors, ImportError, ImportResult, RowError};
use crate::importer::field_mapper::FieldMapper;
use crate::mapping::{validate, MappingError};
use crate::repository::{
    AuditLogRepository, EntityRepository, ImportBatchRepository, RepositoryError, RepositoryResult,
};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashSet;
use std::sync::{Arc, MutexGuard};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// 审计中导入批次的实体类型
pub const BATCH_ENTITY_TYPE: &str = "import_batch";

// ==========================================
// BatchImporterImpl - 批次导入器实现
// ==========================================
pub struct BatchImporterImpl<C>
where
    C: ImportConfigReader,
{
    conn: SharedConnection,
    registry: Arc<SchemaRegistry>,
    config: C,
}

/// 单行落库结果
enum RowDisposition {
    Applied,
    Rejected,
}

/// 批次级上下文（逐行复用）
struct BatchContext<'a> {
    batch_id: &'a str,
    schema: &'a DomainSchema,
    // (字段键, 目标实体类型)
    references: Vec<(&'a str, &'a str)>,
    // 本文件映射到的字段（update 时只覆盖这些字段）
    mapped_keys: Vec<String>,
}

impl<C> BatchImporterImpl<C>
where
    C: ImportConfigReader,
{
    /// 创建新的 BatchImporter 实例
    ///
    /// # 参数
    /// - conn: 共享数据库连接
    /// - registry: Schema 注册表
    /// - config: 配置读取器
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

    /// 前置条件：映射完整、字段键合法且互斥
    fn check_mappings(mappings: &[ColumnMapping], schema: &DomainSchema) -> ImportResult<()> {
        let validation = validate(mappings, schema);
        if !validation.is_valid {
            return Err(ImportError::MappingIncomplete {
                required_total: validation.required_total,
                required_mapped: validation.required_mapped,
                missing: validation.missing_required,
            });
        }

        let mut held = HashSet::new();
        for mapping in mappings.iter().filter(|m| m.is_match()) {
            let Some(key) = mapping.mapped_field_key.as_deref() else {
                continue;
            };
            if schema.field(key).is_none() {
                return Err(MappingError::UnknownField {
                    domain: schema.domain.as_str().to_string(),
                    key: key.to_string(),
                }
                .into());
            }
            if !held.insert(key) {
                return Err(MappingError::DuplicateFieldMapping(key.to_string()).into());
            }
        }
        Ok(())
    }

    /// 记录被拒绝的行（校验阶段失败，不触碰实体）
    fn write_rejection(&self, batch_id: &str, row_index: usize, reason: String) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        ImportBatchRepository::insert_outcome_tx(
            &conn,
            &RowOutcome {
                batch_id: batch_id.to_string(),
                row_index,
                outcome: RowOutcomeKind::Rejected,
                reason: Some(reason),
                entity_id: None,
            },
        )
    }

    /// 单行事务：解析引用 → 判定 create/update → 写实体、引用、变更记录、行结果
    fn apply_row(
        &self,
        ctx: &BatchContext<'_>,
        row_index: usize,
        sequence: usize,
        record: &CanonicalRecord,
    ) -> RepositoryResult<RowDisposition> {
        let schema = ctx.schema;
        let entity_type = schema.entity_type.as_str();
        let Some(entity_id) = record.get(&schema.natural_key).and_then(FieldValue::as_key_text) else {
            self.write_rejection(
                ctx.batch_id,
                row_index,
                RowError::MissingRequired {
                    field: schema.natural_key.clone(),
                }
                .to_string(),
            )?;
            return Ok(RowDisposition::Rejected);
        };

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // ===== 引用解析（同批次前行创建的实体可见） =====
        let mut references = Vec::new();
        for (field_key, target_type) in &ctx.references {
            let Some(target_id) = record.get(field_key).and_then(FieldValue::as_key_text) else {
                continue;
            };
            let self_reference = *target_type == entity_type && target_id == entity_id;
            if !self_reference && EntityRepository::find_tx(&tx, target_type, &target_id)?.is_none() {
                let reason = RowError::UnresolvedReference {
                    field: field_key.to_string(),
                    target_type: target_type.to_string(),
                    target_id,
                }
                .to_string();
                warn!(row_index, entity_id = %entity_id, reason = %reason, "引用解析失败，行拒绝");
                ImportBatchRepository::insert_outcome_tx(
                    &tx,
                    &RowOutcome {
                        batch_id: ctx.batch_id.to_string(),
                        row_index,
                        outcome: RowOutcomeKind::Rejected,
                        reason: Some(reason),
                        entity_id: None,
                    },
                )?;
                tx.commit()?;
                return Ok(RowDisposition::Rejected);
            }
            references.push(EntityReference {
                source_type: entity_type.to_string(),
                source_id: entity_id.clone(),
                field_key: field_key.to_string(),
                target_type: target_type.to_string(),
                target_id,
            });
        }

        // ===== 判定 create / update 并写入 =====
        let now = Utc::now();
        let (operation, prior_state, new_state, revision_after) =
            match EntityRepository::find_tx(&tx, entity_type, &entity_id)? {
                Some(existing) => {
                    let payload = merge_payload(&existing.payload_json, record, &ctx.mapped_keys)?;
                    let revision = EntityRepository::update_tx(
                        &tx,
                        entity_type,
                        &entity_id,
                        &payload,
                        existing.revision,
                        Some(ctx.batch_id),
                        &now,
                    )?;
                    (ChangeOperation::Update, Some(existing.payload_json), payload, revision)
                }
                None => {
                    let payload = record.to_payload_json();
                    let snapshot = EntityRepository::insert_tx(
                        &tx,
                        entity_type,
                        &entity_id,
                        &payload,
                        Some(ctx.batch_id),
                        &now,
                    )?;
                    (ChangeOperation::Create, None, payload, snapshot.revision)
                }
            };
        EntityRepository::replace_references_tx(&tx, entity_type, &entity_id, &references)?;

        let change_seq = ImportBatchRepository::insert_change_tx(
            &tx,
            &ChangeRecord {
                batch_id: ctx.batch_id.to_string(),
                sequence,
                change_seq: 0,
                entity_type: entity_type.to_string(),
                entity_id: entity_id.clone(),
                operation,
                prior_state,
                new_state,
                revision_after,
                created_at: now,
            },
        )?;
        ImportBatchRepository::insert_outcome_tx(
            &tx,
            &RowOutcome {
                batch_id: ctx.batch_id.to_string(),
                row_index,
                outcome: RowOutcomeKind::Applied,
                reason: None,
                entity_id: Some(entity_id.clone()),
            },
        )?;
        tx.commit()?;

        debug!(row_index, entity_id = %entity_id, operation = operation.as_str(), change_seq, "行已应用");
        Ok(RowDisposition::Applied)
    }

    /// 结束批次并写审计（同一事务）
    fn finalize(
        &self,
        batch: &ImportBatch,
        success_rows: usize,
        fail_rows: usize,
        error_message: Option<&str>,
    ) -> RepositoryResult<ImportBatch> {
        let status = if error_message.is_some() || success_rows == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Completed
        };
        let (action, verb) = match status {
            BatchStatus::Completed => (AuditAction::ImportExecuted, "导入完成"),
            _ => (AuditAction::ImportFailed, "导入失败"),
        };

        let entry = AuditEntry::new(
            &batch.submitted_by,
            action,
            BATCH_ENTITY_TYPE,
            Some(&batch.batch_id),
            format!(
                "{} {} ({}): 共 {} 行，成功 {}，失败 {}",
                verb, batch.file_name, batch.domain, batch.total_rows, success_rows, fail_rows
            ),
        )
        .with_payload(json!({
            "domain": batch.domain.as_str(),
            "file_name": batch.file_name,
            "total_rows": batch.total_rows,
            "success_rows": success_rows,
            "fail_rows": fail_rows,
            "error_message": error_message,
        }));

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        ImportBatchRepository::finalize_batch_tx(
            &tx,
            &batch.batch_id,
            status,
            success_rows,
            fail_rows,
            &Utc::now(),
            error_message,
        )?;
        AuditLogRepository::insert_tx(&tx, &entry)?;
        let finished = ImportBatchRepository::find_batch_tx(&tx, &batch.batch_id)?.ok_or_else(|| {
            RepositoryError::NotFound {
                entity: "ImportBatch".to_string(),
                id: batch.batch_id.clone(),
            }
        })?;
        tx.commit()?;
        Ok(finished)
    }
}

/// update 时以现有快照为底，只覆盖本文件映射到的字段
fn merge_payload(
    existing_json: &str,
    record: &CanonicalRecord,
    mapped_keys: &[String],
) -> RepositoryResult<String> {
    let mut map: Map<String, JsonValue> = match serde_json::from_str::<JsonValue>(existing_json)? {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    };
    for key in mapped_keys {
        let value = record.get(key).unwrap_or(&FieldValue::Absent);
        map.insert(key.clone(), value.to_json());
    }
    Ok(JsonValue::Object(map).to_string())
}

#[async_trait]
impl<C> BatchImporter for BatchImporterImpl<C>
where
    C: ImportConfigReader + Send + Sync,
{
    #[instrument(
        skip(self, request),
        fields(
            batch_id,
            domain = %request.domain,
            file_name = %request.file_name,
            rows = request.rows.len()
        )
    )]
    async fn execute(&self, request: ImportRequest) -> ImportResult<ImportBatch> {
        // === 步骤 1: 前置条件（失败不创建批次） ===
        let schema = self.registry.get(request.domain)?;
        Self::check_mappings(&request.mappings, schema)?;

        let max_rows = self
            .config
            .get_max_rows_per_batch()
            .await
            .map_err(|e| ImportError::ConfigReadError(e.to_string()))?;
        if request.rows.len() > max_rows {
            return Err(ImportError::TooManyRows {
                rows: request.rows.len(),
                max: max_rows,
            });
        }

        let mut references = Vec::new();
        for field in schema.reference_fields() {
            if let Some(target) = field.references {
                references.push((field.key.as_str(), self.registry.get(target)?.entity_type.as_str()));
            }
        }

        // === 步骤 2: 创建 pending 批次 ===
        let batch_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("batch_id", batch_id.as_str());
        let batch = ImportBatch {
            batch_id: batch_id.clone(),
            domain: request.domain,
            file_name: request.file_name.clone(),
            submitted_by: request.actor_id.clone(),
            submitted_at: Utc::now(),
            status: BatchStatus::Pending,
            total_rows: request.rows.len(),
            success_rows: 0,
            fail_rows: 0,
            finished_at: None,
            error_message: None,
            rolled_back_at: None,
            rolled_back_by: None,
        };
        {
            let conn = self.get_conn()?;
            ImportBatchRepository::insert_batch_tx(&conn, &batch)?;
        }
        info!(batch_id = %batch_id, actor_id = %request.actor_id, "开始执行导入批次");

        // === 步骤 3: 逐行处理 ===
        let mapper = FieldMapper::new(schema, &request.mappings);
        let validator = DqValidator::new(schema);
        let ctx = BatchContext {
            batch_id: &batch_id,
            schema,
            references,
            mapped_keys: mapper.mapped_keys().map(str::to_string).collect(),
        };

        let mut success_rows = 0;
        let mut fail_rows = 0;
        let mut storage_error: Option<String> = None;

        for (row_index, row) in request.rows.iter().enumerate() {
            let step = match mapper.map_row(row) {
                Err(errors) => Err(errors),
                Ok(record) => {
                    let violations = validator.validate(&record);
                    if violations.is_empty() {
                        Ok(record)
                    } else {
                        Err(violations)
                    }
                }
            };

            let result = match step {
                Ok(record) => self.apply_row(&ctx, row_index, success_rows, &record),
                Err(errors) => {
                    let reason = join_row_errors(&errors);
                    warn!(row_index, reason = %reason, "行校验失败");
                    self.write_rejection(&batch_id, row_index, reason)
                        .map(|_| RowDisposition::Rejected)
                }
            };

            match result {
                Ok(RowDisposition::Applied) => success_rows += 1,
                Ok(RowDisposition::Rejected) => fail_rows += 1,
                Err(e) => {
                    error!(row_index, error = %e, "存储失败，批次中止");
                    storage_error = Some(format!("第 {} 行存储失败: {}", row_index, e));
                    break;
                }
            }

            // 行边界让出执行权，使并发批次交错推进
            tokio::task::yield_now().await;
        }

        // === 步骤 4: 结束批次 ===
        let finished = match self.finalize(&batch, success_rows, fail_rows, storage_error.as_deref()) {
            Ok(finished) => finished,
            Err(e) => {
                // 结束失败时再尝试一次 failed，避免批次停留在 pending
                error!(batch_id = %batch_id, error = %e, "结束批次失败，改记为 failed");
                let message = match &storage_error {
                    Some(prev) => format!("{}；结束批次失败: {}", prev, e),
                    None => format!("结束批次失败: {}", e),
                };
                self.finalize(&batch, success_rows, fail_rows, Some(&message))
                    .map_err(|retry| {
                        error!(batch_id = %batch_id, error = %retry, "批次仍为 pending");
                        e
                    })?
            }
        };
        info!(
            batch_id = %batch_id,
            status = %finished.status,
            total = finished.total_rows,
            success = finished.success_rows,
            failed = finished.fail_rows,
            "导入批次结束"
        );
        Ok(finished)
    }

    async fn execute_many(&self, requests: Vec<ImportRequest>) -> Vec<ImportResult<ImportBatch>> {
        use futures::future::join_all;

        info!(count = requests.len(), "开始并发执行多个导入批次");

        let tasks = requests.into_iter().map(|request| {
            let file_name = request.file_name.clone();
            async move {
                let result = self.execute(request).await;
                if let Err(e) = &result {
                    error!(file = %file_name, error = %e, "文件导入失败");
                }
                result
            }
        });
        let results = join_all(tasks).await;

        info!(
            total = results.len(),
            success = results.iter().filter(|r| r.is_ok()).count(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "并发导入完成"
        );
        results
    }
}
