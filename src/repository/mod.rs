// ==========================================
// 批量导入与回滚账本 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: `*_tx` 关联函数在调用方事务内执行
// ==========================================

pub mod audit_log_repo;
pub mod entity_repo;
pub mod error;
pub mod import_batch_repo;
pub mod row_utils;

// 重导出核心仓储
pub use audit_log_repo::AuditLogRepository;
pub use entity_repo::EntityRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use import_batch_repo::{BatchStatusCounts, ImportBatchRepository};
