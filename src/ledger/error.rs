// ==========================================
// 批量导入与回滚账本 - 账本层错误类型
// ==========================================

use crate::domain::import::BatchStatus;
use crate::domain::rollback::RollbackBlocker;
use crate::domain::schema::SchemaError;
use crate::repository::RepositoryError;
use thiserror::Error;

/// 回滚错误类型
#[derive(Error, Debug)]
pub enum RollbackError {
    #[error("导入批次不存在: {0}")]
    BatchNotFound(String),

    #[error("批次状态不允许回滚: batch_id={batch_id}, status={status}")]
    NotRollbackEligible { batch_id: String, status: BatchStatus },

    /// 回滚不安全：整体中止，批次保持 completed
    #[error("回滚不安全: batch_id={batch_id}, 阻塞实体 {} 个", .blockers.len())]
    Unsafe {
        batch_id: String,
        blockers: Vec<RollbackBlocker>,
    },

    #[error("配置读取失败: {0}")]
    ConfigReadError(String),

    #[error("Schema 错误: {0}")]
    Schema(#[from] SchemaError),

    #[error("存储失败: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<rusqlite::Error> for RollbackError {
    fn from(err: rusqlite::Error) -> Self {
        RollbackError::Repository(err.into())
    }
}

/// Result 类型别名
pub type LedgerResult<T> = Result<T, RollbackError>;
