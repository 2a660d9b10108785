// ==========================================
// 批量导入与回滚账本 - 审计日志领域模型
// ==========================================
// 红线: 所有写入必须记录，写入后不可修改
// 用途: 审计追踪，仪表盘活动流
// 对齐: audit_log 表
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// ==========================================
// AuditEntry - 审计条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    pub actor_id: String,             // 操作人（由身份协作方提供）
    pub action: String,               // 操作类型 (存储为字符串)
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub description: String,
    pub payload_json: Option<JsonValue>, // 结构化明细（可选）
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor_id: &str,
        action: AuditAction,
        entity_type: &str,
        entity_id: Option<&str>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            actor_id: actor_id.to_string(),
            action: action.as_str().to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            description: description.into(),
            payload_json: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload_json = Some(payload);
        self
    }
}

// ==========================================
// AuditAction - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    ImportExecuted,   // 导入完成
    ImportFailed,     // 导入失败
    ImportRolledBack, // 导入回滚
    EntityCreated,    // 人工新建
    EntityUpdated,    // 人工修改
    EntityDeleted,    // 人工删除
}

impl AuditAction {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ImportExecuted => "IMPORT_EXECUTED",
            AuditAction::ImportFailed => "IMPORT_FAILED",
            AuditAction::ImportRolledBack => "IMPORT_ROLLED_BACK",
            AuditAction::EntityCreated => "ENTITY_CREATED",
            AuditAction::EntityUpdated => "ENTITY_UPDATED",
            AuditAction::EntityDeleted => "ENTITY_DELETED",
        }
    }
}

// ==========================================
// AuditFilter - 活动流查询过滤
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}
