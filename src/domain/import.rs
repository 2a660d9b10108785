// ==========================================
// 批量导入与回滚账本 - 导入批次领域模型
// ==========================================
// 用途: 导入批次 / 行结果 / 变更记录 / 单元格值
// 生命周期: 批次 pending → completed|failed，completed → rolled_back
// ==========================================

use crate::domain::schema::ImportDomain;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

// ==========================================
// CellValue - 解码协作方交付的单元格原始值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    /// 转为去空白文本，空值返回 None
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            CellValue::Number(n) => Some(format_number(*n)),
            CellValue::Bool(b) => Some(b.to_string()),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_text().is_none()
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

/// 一行原始记录（表头 → 单元格）
pub type RawRow = HashMap<String, CellValue>;

// ==========================================
// FieldValue - 类型转换后的标准字段值
// ==========================================
// 红线: 可选字段为空时为 Absent（落库为 JSON null），不是空字符串
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Decimal(f64),
    Integer(i64),
    Date(NaiveDate),
    Absent,
}

impl FieldValue {
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Text(s) => JsonValue::String(s.clone()),
            FieldValue::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            FieldValue::Integer(i) => JsonValue::from(*i),
            FieldValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::Absent => JsonValue::Null,
        }
    }

    pub fn as_key_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Decimal(d) => Some(format_number(*d)),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::Absent => None,
        }
    }
}

// ==========================================
// CanonicalRecord - 投影 + 校验后的标准记录
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalRecord {
    pub fields: BTreeMap<String, FieldValue>,
}

impl CanonicalRecord {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// 序列化为实体快照 JSON（键有序，保证快照稳定）
    pub fn to_payload_json(&self) -> String {
        let map: Map<String, JsonValue> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        JsonValue::Object(map).to_string()
    }
}

// ==========================================
// BatchStatus - 批次状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Completed,
    Failed,
    RolledBack,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::RolledBack => "rolled_back",
        }
    }

    /// 合法状态转换
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (BatchStatus::Pending, BatchStatus::Completed)
                | (BatchStatus::Pending, BatchStatus::Failed)
                | (BatchStatus::Completed, BatchStatus::RolledBack)
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchStatus::Pending),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            "rolled_back" => Ok(BatchStatus::RolledBack),
            other => Err(format!("未知批次状态: {}", other)),
        }
    }
}

// ==========================================
// ImportBatch - 导入批次
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,
    pub domain: ImportDomain,
    pub file_name: String,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    pub status: BatchStatus,
    pub total_rows: usize,
    pub success_rows: usize,
    pub fail_rows: usize,

    // ===== 扩展字段 =====
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>, // 存储失败原因（仅 failed）
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub rolled_back_by: Option<String>,
}

// ==========================================
// RowOutcome - 行结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcomeKind {
    Applied,
    Rejected,
}

impl RowOutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowOutcomeKind::Applied => "applied",
            RowOutcomeKind::Rejected => "rejected",
        }
    }
}

impl FromStr for RowOutcomeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "applied" => Ok(RowOutcomeKind::Applied),
            "rejected" => Ok(RowOutcomeKind::Rejected),
            other => Err(format!("未知行结果: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub batch_id: String,
    pub row_index: usize, // 文件内行序（0 起）
    pub outcome: RowOutcomeKind,
    pub reason: Option<String>,
    pub entity_id: Option<String>,
}

// ==========================================
// ChangeRecord - 实际执行的变更（回滚依据）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Create,
    Update,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Create => "create",
            ChangeOperation::Update => "update",
        }
    }
}

impl FromStr for ChangeOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeOperation::Create),
            "update" => Ok(ChangeOperation::Update),
            other => Err(format!("未知变更类型: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub batch_id: String,
    pub sequence: usize,       // 批次内应用顺序
    pub change_seq: i64,       // 全局变更序号（跨批次排序）
    pub entity_type: String,
    pub entity_id: String,
    pub operation: ChangeOperation,
    pub prior_state: Option<String>, // 变更前完整快照（create 时为空）
    pub new_state: String,
    pub revision_after: i64,   // 变更后的实体修订号
    pub created_at: DateTime<Utc>,
}
