// ==========================================
// 批量导入与回滚账本 - 审计与回滚账本层
// ==========================================
// 职责: 追加审计、以补偿操作回滚导入批次
// 红线: 审计仅追加；回滚要么整体生效要么整体不动
// ==========================================

pub mod audit_recorder;
pub mod error;
pub mod references;
pub mod rollback_service;

pub use audit_recorder::AuditRecorder;
pub use error::{LedgerResult, RollbackError};
pub use references::derive_references;
pub use rollback_service::RollbackService;
