// ==========================================
// 批量导入与回滚账本 - 业务实体快照
// ==========================================
// 用途: 目标存储中的实体（商品/送货单/台账），以 JSON 快照保存
// 对齐: entity_record / entity_reference 表
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// EntitySnapshot - 实体当前状态
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_type: String,
    pub entity_id: String,      // 自然键
    pub payload_json: String,   // 完整快照（原样保存，回滚时逐字节恢复）
    pub revision: i64,          // 每次写入 +1
    pub last_batch_id: Option<String>, // 最后写入的导入批次（人工操作为空）
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntitySnapshot {
    pub fn payload(&self) -> JsonValue {
        serde_json::from_str(&self.payload_json).unwrap_or(JsonValue::Null)
    }
}

// ==========================================
// EntityReference - 实体间引用（依赖关系）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference {
    pub source_type: String,
    pub source_id: String,
    pub field_key: String,
    pub target_type: String,
    pub target_id: String,
}

/// 实体定位（类型 + 自然键）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: &str, entity_id: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}
