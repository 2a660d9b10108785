// ==========================================
// 批量导入与回滚账本 - 导入API
// ==========================================
// 职责: 封装 schema 查询、列映射、批次执行、回滚与账本查询
// 调用方: CLI / 仪表盘协作方（只读轮询 + 显式执行/回滚）
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ImportConfigReader};
use crate::db::{open_shared, SharedConnection};
use crate::domain::audit::{AuditAction, AuditEntry, AuditFilter};
use crate::domain::import::{ChangeRecord, ImportBatch, RowOutcome};
use crate::domain::mapping::{ColumnMapping, MappingValidation};
use crate::domain::rollback::{RollbackPreview, RollbackResult};
use crate::domain::schema::{DomainSchema, ImportDomain, SchemaRegistry};
use crate::domain::types::{Page, PageRequest};
use crate::importer::{BatchImporter, BatchImporterImpl, ImportRequest};
use crate::ledger::{AuditRecorder, RollbackService};
use crate::mapping::{self, MappingSession};
use crate::repository::{AuditLogRepository, BatchStatusCounts, ImportBatchRepository};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// 批次详情（行结果 + 变更记录）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDetail {
    pub batch: ImportBatch,
    pub outcomes: Vec<RowOutcome>,
    pub changes: Vec<ChangeRecord>,
}

/// 导入API
pub struct ImportApi {
    registry: Arc<SchemaRegistry>,
    config: Arc<ConfigManager>,
    importer: BatchImporterImpl<Arc<ConfigManager>>,
    rollback_service: RollbackService<Arc<ConfigManager>>,
    batch_repo: ImportBatchRepository,
    audit_repo: AuditLogRepository,
    recorder: AuditRecorder,
}

impl ImportApi {
    /// 基于共享连接创建 ImportApi
    pub fn new(conn: SharedConnection, registry: Arc<SchemaRegistry>) -> ApiResult<Self> {
        let config = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| ApiError::ConfigError(e.to_string()))?,
        );
        Ok(Self {
            importer: BatchImporterImpl::new(conn.clone(), registry.clone(), config.clone()),
            rollback_service: RollbackService::new(conn.clone(), registry.clone(), config.clone()),
            batch_repo: ImportBatchRepository::new(conn.clone()),
            audit_repo: AuditLogRepository::new(conn.clone()),
            recorder: AuditRecorder::new(conn),
            registry,
            config,
        })
    }

    /// 打开数据库文件（自动建表）并使用内置 schema
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let conn = open_shared(db_path).map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        Self::new(conn, Arc::new(SchemaRegistry::builtin()?))
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    // ==========================================
    // Schema 与列映射（纯函数，无 I/O）
    // ==========================================

    pub fn schemas(&self) -> &[DomainSchema] {
        self.registry.schemas()
    }

    pub fn schema(&self, domain: ImportDomain) -> ApiResult<&DomainSchema> {
        Ok(self.registry.get(domain)?)
    }

    /// 为表头生成候选映射
    pub fn propose_mapping(&self, domain: ImportDomain, headers: &[String]) -> ApiResult<Vec<ColumnMapping>> {
        Ok(mapping::propose(headers, self.registry.get(domain)?))
    }

    /// 校验映射完整性
    pub fn validate_mapping(
        &self,
        domain: ImportDomain,
        mappings: &[ColumnMapping],
    ) -> ApiResult<MappingValidation> {
        Ok(mapping::validate(mappings, self.registry.get(domain)?))
    }

    /// 开启一个映射会话（调用方持有）
    pub fn start_mapping(&self, domain: ImportDomain, headers: Vec<String>) -> ApiResult<MappingSession> {
        Ok(MappingSession::new(self.registry.get(domain)?, headers)?)
    }

    // ==========================================
    // 执行与回滚
    // ==========================================

    /// 执行一个导入批次
    pub async fn execute(&self, request: ImportRequest) -> ApiResult<ImportBatch> {
        Ok(self.importer.execute(request).await?)
    }

    /// 并发执行多个导入批次（各自独立成败）
    pub async fn execute_many(&self, requests: Vec<ImportRequest>) -> Vec<ApiResult<ImportBatch>> {
        self.importer
            .execute_many(requests)
            .await
            .into_iter()
            .map(|r| r.map_err(ApiError::from))
            .collect()
    }

    /// 回滚一个已完成的批次
    pub async fn rollback(&self, batch_id: &str, actor_id: &str) -> ApiResult<RollbackResult> {
        Ok(self.rollback_service.rollback(batch_id, actor_id).await?)
    }

    /// 回滚预检（不落库）
    pub async fn preview_rollback(&self, batch_id: &str) -> ApiResult<RollbackPreview> {
        Ok(self.rollback_service.preview(batch_id).await?)
    }

    // ==========================================
    // 账本查询（仪表盘）
    // ==========================================

    /// 批次历史（最近优先）
    pub async fn list_batches(&self, page: PageRequest) -> ApiResult<Page<ImportBatch>> {
        let page = page.clamped(self.max_page_size().await?);
        Ok(self.batch_repo.list_recent(page)?)
    }

    pub fn batch_detail(&self, batch_id: &str) -> ApiResult<BatchDetail> {
        let batch = self
            .batch_repo
            .find_batch(batch_id)?
            .ok_or_else(|| ApiError::NotFound(format!("导入批次(id={})不存在", batch_id)))?;
        Ok(BatchDetail {
            outcomes: self.batch_repo.list_outcomes(batch_id)?,
            changes: self.batch_repo.list_changes(batch_id)?,
            batch,
        })
    }

    /// 审计活动流（最近优先，可按操作人/实体过滤）
    pub async fn list_audit(&self, filter: &AuditFilter, page: PageRequest) -> ApiResult<Page<AuditEntry>> {
        let page = page.clamped(self.max_page_size().await?);
        Ok(self.audit_repo.list(filter, page)?)
    }

    pub fn summary(&self) -> ApiResult<BatchStatusCounts> {
        Ok(self.batch_repo.status_counts()?)
    }

    /// 为外部变更追加审计（导入之外的写操作）
    pub fn record_audit(
        &self,
        actor_id: &str,
        action: AuditAction,
        entity_type: &str,
        entity_id: Option<&str>,
        description: &str,
        payload: Option<JsonValue>,
    ) -> ApiResult<AuditEntry> {
        Ok(self
            .recorder
            .record_audit(actor_id, action, entity_type, entity_id, description, payload)?)
    }

    async fn max_page_size(&self) -> ApiResult<usize> {
        self.config
            .get_max_page_size()
            .await
            .map_err(|e| ApiError::ConfigError(e.to_string()))
    }
}
