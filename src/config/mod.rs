// ==========================================
// 批量导入与回滚账本 - 配置层
// ==========================================
// 职责: 系统配置管理
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, defaults, get_default_db_path, ConfigManager, DB_PATH_ENV};
pub use import_config_trait::{ConfigResult, ImportConfigReader};
