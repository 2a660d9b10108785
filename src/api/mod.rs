// ==========================================
// 批量导入与回滚账本 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供 CLI 与仪表盘协作方调用
// ==========================================

pub mod entity_api;
pub mod error;
pub mod import_api;

// 重导出核心类型
pub use entity_api::EntityApi;
pub use error::{ApiError, ApiResult};
pub use import_api::{BatchDetail, ImportApi};
