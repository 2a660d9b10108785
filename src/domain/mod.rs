// ==========================================
// 批量导入与回滚账本 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod audit;
pub mod entity;
pub mod import;
pub mod mapping;
pub mod rollback;
pub mod schema;
pub mod types;

// 重导出核心类型
pub use audit::{AuditAction, AuditEntry, AuditFilter};
pub use entity::{EntityRef, EntityReference, EntitySnapshot};
pub use import::{
    BatchStatus, CanonicalRecord, CellValue, ChangeOperation, ChangeRecord, FieldValue,
    ImportBatch, RawRow, RowOutcome, RowOutcomeKind,
};
pub use mapping::{ColumnMapping, MappingStatus, MappingValidation, RawColumn};
pub use rollback::{
    BlockReason, ReviewItem, ReviewReason, RollbackBlocker, RollbackPreview, RollbackResult,
};
pub use schema::{
    DomainSchema, FieldKind, FieldSpec, ImportDomain, SchemaError, SchemaRegistry,
};
pub use types::{Page, PageRequest};
