// ==========================================
// 批量导入与回滚账本 - 配置读取 Trait
// ==========================================
// 职责: 定义导入/回滚/查询所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取单批次最大行数
    ///
    /// # 默认值
    /// - 10000
    async fn get_max_rows_per_batch(&self) -> ConfigResult<usize>;

    /// 获取分页查询上限
    ///
    /// # 默认值
    /// - 100
    async fn get_max_page_size(&self) -> ConfigResult<usize>;

    /// 存在降级项（后续批次修改、修订号漂移）时是否仍允许回滚
    ///
    /// # 默认值
    /// - true
    async fn get_allow_degraded_rollback(&self) -> ConfigResult<bool>;
}

#[async_trait]
impl<T> ImportConfigReader for std::sync::Arc<T>
where
    T: ImportConfigReader + ?Sized,
{
    async fn get_max_rows_per_batch(&self) -> ConfigResult<usize> {
        (**self).get_max_rows_per_batch().await
    }

    async fn get_max_page_size(&self) -> ConfigResult<usize> {
        (**self).get_max_page_size().await
    }

    async fn get_allow_degraded_rollback(&self) -> ConfigResult<bool> {
        (**self).get_allow_degraded_rollback().await
    }
}
