// ==========================================
// 批量导入与回滚账本 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 映射: rusqlite 错误码 → 语义化变体（繁忙/主键冲突/审计只追加）
// ==========================================

use rusqlite::ErrorCode;
use thiserror::Error;

/// 审计表触发器的拒绝信息（与 db.rs 中的 RAISE 文本一致）
const APPEND_ONLY_MARKER: &str = "append-only";

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 并发控制错误 =====
    #[error("修订号冲突: {entity}，期望 revision={expected}，实际 revision={actual}")]
    OptimisticLockFailure {
        entity: String,
        expected: i64,
        actual: i64,
    },

    #[error("数据库繁忙，写锁等待超时: {0}")]
    Busy(String),

    #[error("连接锁获取失败: {0}")]
    LockError(String),

    // ===== 记录错误 =====
    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    #[error("主键冲突: {0}")]
    DuplicateKey(String),

    #[error("审计日志只允许追加: {0}")]
    AppendOnlyViolation(String),

    #[error("快照数据损坏 (字段 {field}): {message}")]
    CorruptRecord { field: String, message: String },

    #[error("SQLite 错误: {0}")]
    Sqlite(String),

    // ===== 状态错误 =====
    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, msg) => {
                let msg = msg.unwrap_or_else(|| failure.to_string());
                match failure.code {
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => RepositoryError::Busy(msg),
                    ErrorCode::ConstraintViolation if msg.contains(APPEND_ONLY_MARKER) => {
                        RepositoryError::AppendOnlyViolation(msg)
                    }
                    ErrorCode::ConstraintViolation
                        if msg.contains("UNIQUE") || msg.contains("PRIMARY KEY") =>
                    {
                        RepositoryError::DuplicateKey(msg)
                    }
                    _ => RepositoryError::Sqlite(msg),
                }
            }
            rusqlite::Error::FromSqlConversionFailure(idx, _, e) => RepositoryError::CorruptRecord {
                field: format!("column#{}", idx),
                message: e.to_string(),
            },
            other => RepositoryError::Sqlite(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::CorruptRecord {
            field: "payload_json".to_string(),
            message: err.to_string(),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
