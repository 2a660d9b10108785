// ==========================================
// 批量导入与回滚账本 - 导入执行层
// ==========================================
// 职责: 校验并应用已映射的行，记录行结果与可回滚变更集
// 依赖: domain::schema, mapping
// ==========================================

pub mod batch_importer_impl;
pub mod batch_importer_trait;
pub mod dq_validator;
pub mod error;
pub mod field_mapper;

pub use batch_importer_impl::{BatchImporterImpl, BATCH_ENTITY_TYPE};
pub use batch_importer_trait::{BatchImporter, ImportRequest};
pub use dq_validator::DqValidator;
pub use error::{join_row_errors, ImportError, ImportResult, RowError};
pub use field_mapper::{coerce_cell, FieldMapper};
