// ==========================================
// 批量导入与回滚账本 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，把各层技术错误转换为带显式原因的业务错误
// ==========================================

use crate::domain::rollback::RollbackBlocker;
use crate::domain::schema::SchemaError;
use crate::importer::ImportError;
use crate::ledger::RollbackError;
use crate::mapping::MappingError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 映射与导入前置条件错误
    // ==========================================
    #[error("映射不完整: 必填字段已映射 {required_mapped}/{required_total}，缺少 {missing:?}")]
    MappingIncomplete {
        required_total: usize,
        required_mapped: usize,
        missing: Vec<String>,
    },

    #[error("映射无效: {0}")]
    InvalidMapping(String),

    // ==========================================
    // 回滚错误
    // ==========================================
    #[error("批次不可回滚: batch_id={batch_id}, status={status}")]
    NotRollbackEligible { batch_id: String, status: String },

    #[error("回滚不安全: batch_id={batch_id}, 阻塞实体 {} 个", .blockers.len())]
    RollbackUnsafe {
        batch_id: String,
        blockers: Vec<RollbackBlocker>,
    },

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 导入错误
    // ==========================================
    #[error("文件导入失败: {0}")]
    ImportError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

// ==========================================
// 各层错误 → ApiError
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::OptimisticLockFailure {
                entity,
                expected,
                actual,
            } => ApiError::OptimisticLockFailure(format!(
                "{}已被其他操作修改（期望revision={}，实际revision={}）",
                entity, expected, actual
            )),
            RepositoryError::Busy(msg) => {
                ApiError::DatabaseTransactionError(format!("数据库繁忙，请稍后重试: {}", msg))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }

            // 记录错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DuplicateKey(msg) => {
                ApiError::BusinessRuleViolation(format!("主键冲突: {}", msg))
            }
            RepositoryError::AppendOnlyViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::CorruptRecord { field, message } => {
                ApiError::InternalError(format!("快照数据损坏 (字段 {}): {}", field, message))
            }
            RepositoryError::Sqlite(msg) => ApiError::DatabaseError(msg),

            // 状态错误
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
        }
    }
}

impl From<MappingError> for ApiError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::DomainMismatch { .. } | MappingError::IllegalTransition { .. } => {
                ApiError::InvalidStateTransition {
                    from: "mapping".to_string(),
                    to: err.to_string(),
                }
            }
            other => ApiError::InvalidMapping(other.to_string()),
        }
    }
}

impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::UnknownDomain(_) | SchemaError::UnknownEntityType(_) => {
                ApiError::NotFound(err.to_string())
            }
            other => ApiError::ConfigError(other.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::MappingIncomplete {
                required_total,
                required_mapped,
                missing,
            } => ApiError::MappingIncomplete {
                required_total,
                required_mapped,
                missing,
            },
            ImportError::Mapping(e) => e.into(),
            ImportError::TooManyRows { .. } => ApiError::ImportError(err.to_string()),
            ImportError::Schema(e) => e.into(),
            ImportError::ConfigReadError(msg) => ApiError::ConfigError(msg),
            ImportError::Repository(e) => e.into(),
            ImportError::InternalError(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<RollbackError> for ApiError {
    fn from(err: RollbackError) -> Self {
        match err {
            RollbackError::BatchNotFound(batch_id) => {
                ApiError::NotFound(format!("导入批次(id={})不存在", batch_id))
            }
            RollbackError::NotRollbackEligible { batch_id, status } => {
                ApiError::NotRollbackEligible {
                    batch_id,
                    status: status.to_string(),
                }
            }
            RollbackError::Unsafe { batch_id, blockers } => {
                ApiError::RollbackUnsafe { batch_id, blockers }
            }
            RollbackError::ConfigReadError(msg) => ApiError::ConfigError(msg),
            RollbackError::Schema(e) => e.into(),
            RollbackError::Repository(e) => e.into(),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::BatchStatus;

    #[test]
    fn test_repository_not_found_maps_to_not_found() {
        let err: ApiError = RepositoryError::NotFound {
            entity: "ImportBatch".to_string(),
            id: "b1".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::NotFound(msg) if msg.contains("b1")));
    }

    #[test]
    fn test_import_error_keeps_mapping_counts() {
        let err: ApiError = ImportError::MappingIncomplete {
            required_total: 3,
            required_mapped: 2,
            missing: vec!["price".to_string()],
        }
        .into();
        assert!(matches!(
            err,
            ApiError::MappingIncomplete {
                required_total: 3,
                required_mapped: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_rollback_error_mapping() {
        let err: ApiError = RollbackError::NotRollbackEligible {
            batch_id: "b1".to_string(),
            status: BatchStatus::Failed,
        }
        .into();
        assert_eq!(err.to_string(), "批次不可回滚: batch_id=b1, status=failed");
    }
}
