// ==========================================
// 批量导入与回滚账本 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分层: ImportError 为批次级（前置条件/存储），RowError 为行级（写入 RowOutcome）
// ==========================================

use crate::domain::schema::SchemaError;
use crate::mapping::MappingError;
use crate::repository::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型（批次级）
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 前置条件错误（不创建批次） =====
    #[error("映射不完整: 必填字段已映射 {required_mapped}/{required_total}，缺少 {missing:?}")]
    MappingIncomplete {
        required_total: usize,
        required_mapped: usize,
        missing: Vec<String>,
    },

    #[error("映射无效: {0}")]
    Mapping(#[from] MappingError),

    #[error("行数超出单批次上限: {rows} > {max}")]
    TooManyRows { rows: usize, max: usize },

    #[error("Schema 错误: {0}")]
    Schema(#[from] SchemaError),

    // ===== 配置错误 =====
    #[error("配置读取失败: {0}")]
    ConfigReadError(String),

    // ===== 存储错误 =====
    #[error("存储失败: {0}")]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),
}

/// 行级校验失败原因（记录为 RowOutcome.reason，不中断批次）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("必填字段为空: {field}")]
    MissingRequired { field: String },

    #[error("数值格式错误 (字段 {field}): {value}")]
    InvalidDecimal { field: String, value: String },

    #[error("整数格式错误 (字段 {field}): {value}")]
    InvalidInteger { field: String, value: String },

    #[error("日期格式错误 (字段 {field}): {value}")]
    InvalidDate { field: String, value: String },

    #[error("数值低于下限 (字段 {field}): {value} < {min}")]
    BelowMinimum { field: String, value: f64, min: f64 },

    #[error("引用不存在 (字段 {field}): {target_type}:{target_id}")]
    UnresolvedReference {
        field: String,
        target_type: String,
        target_id: String,
    },
}

/// 多条行级错误合并为一条原因
pub fn join_row_errors(errors: &[RowError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
