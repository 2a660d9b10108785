// ==========================================
// 批量导入与回滚账本 - 核心库
// ==========================================
// 技术栈: Rust + SQLite (rusqlite)
// 数据流: 表头映射 → 逐行校验与应用 → 批次账本 → 可补偿回滚
// ==========================================

// ===== 领域与存储 =====
pub mod domain; // 导入域 schema、批次、变更、审计条目
pub mod repository; // SQLite 访问（批次/变更/实体/审计）
pub mod db; // 连接打开、PRAGMA、建表

// ===== 业务流程 =====
pub mod mapping; // 表头 → 字段候选与映射会话
pub mod importer; // 批次执行与逐行处理
pub mod ledger; // 审计追加、回滚预检与补偿

// ===== 外壳 =====
pub mod config;
pub mod logging;
pub mod api;
pub mod app; // 命令行

pub use api::{ApiError, EntityApi, ImportApi};
pub use domain::{
    AuditEntry, ColumnMapping, DomainSchema, ImportBatch, ImportDomain, RollbackResult,
    SchemaRegistry,
};

/// 库版本（来自 Cargo.toml）
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 命令行展示名称
pub const APP_NAME: &str = "批量导入与回滚账本";
