// ==========================================
// 批量导入与回滚账本 - 列映射错误类型
// ==========================================

use thiserror::Error;

/// 列映射模块错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("表头不存在: {0}")]
    UnknownHeader(String),

    #[error("表头重复: {0}")]
    DuplicateHeader(String),

    #[error("字段不存在 (domain={domain}): {key}")]
    UnknownField { domain: String, key: String },

    #[error("字段被多列同时映射: {0}")]
    DuplicateFieldMapping(String),

    #[error("导入域不一致: 期望 {expected}，实际 {actual}")]
    DomainMismatch { expected: String, actual: String },

    #[error("向导状态不允许该操作: 当前 {from}，操作 {action}")]
    IllegalTransition {
        from: &'static str,
        action: &'static str,
    },
}

/// Result 类型别名
pub type MappingResult<T> = Result<T, MappingError>;
