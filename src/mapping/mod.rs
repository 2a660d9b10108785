// ==========================================
// 批量导入与回滚账本 - 列映射层
// ==========================================
// 职责: 表头归一化、建议映射、人工改映射、完整性校验
// 依赖: domain::schema
// ==========================================

pub mod column_mapper;
pub mod error;
pub mod session;

pub use column_mapper::{build_raw_columns, normalize_header, propose, remap, validate, DEFAULT_SAMPLE_SIZE};
pub use error::{MappingError, MappingResult};
pub use session::{ImportWizard, MappingSession};
