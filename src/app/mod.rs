// ==========================================
// 批量导入与回滚账本 - 应用层
// ==========================================
// 职责: 命令行外壳，连接文件解码协作方与 API
// ==========================================

pub mod cli;
pub mod commands;
pub mod csv_source;
pub mod state;

// 重导出
pub use cli::Cli;
pub use commands::run;
pub use state::AppState;
