// ==========================================
// Mock 配置实现 - 用于集成测试
// ==========================================

use async_trait::async_trait;
use import_ledger::config::{defaults, ConfigResult, ImportConfigReader};

/// Mock 配置结构
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub max_rows_per_batch: usize,
    pub max_page_size: usize,
    pub allow_degraded_rollback: bool,
}

impl MockConfig {
    /// 创建默认配置
    pub fn default() -> Self {
        Self {
            max_rows_per_batch: defaults::MAX_ROWS_PER_BATCH,
            max_page_size: defaults::MAX_PAGE_SIZE,
            allow_degraded_rollback: defaults::ALLOW_DEGRADED_ROLLBACK,
        }
    }

    /// 创建行数上限配置
    pub fn with_max_rows(max_rows: usize) -> Self {
        let mut config = Self::default();
        config.max_rows_per_batch = max_rows;
        config
    }

    /// 创建严格回滚配置（降级项视为阻塞）
    pub fn strict_rollback() -> Self {
        let mut config = Self::default();
        config.allow_degraded_rollback = false;
        config
    }
}

#[async_trait]
impl ImportConfigReader for MockConfig {
    async fn get_max_rows_per_batch(&self) -> ConfigResult<usize> {
        Ok(self.max_rows_per_batch)
    }

    async fn get_max_page_size(&self) -> ConfigResult<usize> {
        Ok(self.max_page_size)
    }

    async fn get_allow_degraded_rollback(&self) -> ConfigResult<bool> {
        Ok(self.allow_degraded_rollback)
    }
}
