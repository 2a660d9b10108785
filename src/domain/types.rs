// ==========================================
// 批量导入与回滚账本 - 通用类型
// ==========================================

use serde::{Deserialize, Serialize};

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: usize = 20;

// ==========================================
// PageRequest - 分页请求（最近优先）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// 将 limit 限制在 [1, max_limit]
    pub fn clamped(self, max_limit: usize) -> Self {
        Self {
            limit: self.limit.clamp(1, max_limit.max(1)),
            offset: self.offset,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

// ==========================================
// Page - 分页结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}
