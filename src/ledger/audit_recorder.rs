// ==========================================
// 批量导入与回滚账本 - 审计记录器
// ==========================================
// 红线: 所有变更操作都必须追加一条审计（导入、回滚、人工增删改）
// ==========================================

use crate::db::SharedConnection;
use crate::domain::audit::{AuditAction, AuditEntry};
use crate::repository::{AuditLogRepository, RepositoryResult};
use serde_json::Value as JsonValue;
use tracing::info;

pub struct AuditRecorder {
    repo: AuditLogRepository,
}

impl AuditRecorder {
    pub fn new(conn: SharedConnection) -> Self {
        Self {
            repo: AuditLogRepository::new(conn),
        }
    }

    /// 追加一条审计
    ///
    /// # 参数
    /// - actor_id: 操作人（身份协作方提供，不做认证）
    /// - action: 操作类型
    /// - entity_type / entity_id: 操作对象
    /// - description: 人类可读描述
    pub fn record_audit(
        &self,
        actor_id: &str,
        action: AuditAction,
        entity_type: &str,
        entity_id: Option<&str>,
        description: &str,
        payload: Option<JsonValue>,
    ) -> RepositoryResult<AuditEntry> {
        let mut entry = AuditEntry::new(actor_id, action, entity_type, entity_id, description);
        entry.payload_json = payload;
        self.repo.insert(&entry)?;

        info!(
            entry_id = %entry.entry_id,
            actor_id = %actor_id,
            action = %entry.action,
            entity_type = %entity_type,
            "审计已记录"
        );
        Ok(entry)
    }
}
