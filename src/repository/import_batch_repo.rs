// ==========================================
// 批量导入与回滚账本 - 导入批次数据仓储
// ==========================================
// 对齐: import_batch / import_row_outcome / import_change_record 表
// 红线: 批次子记录只追加，不修改
// ==========================================

mod core;
mod queries;

#[cfg(test)]
mod tests;

pub use core::ImportBatchRepository;
pub use queries::BatchStatusCounts;
