// ==========================================
// 批量导入与回滚账本 - 审计日志数据仓储
// ==========================================
// 对齐: audit_log 表
// 红线: 所有写入必须记录，仅追加
// ==========================================

mod core;
mod queries;


pub use core::AuditLogRepository;
