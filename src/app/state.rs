// ==========================================
// 批量导入与回滚账本 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享连接和API实例
// ==========================================

use std::sync::Arc;

use crate::api::{ApiError, ApiResult, EntityApi, ImportApi};
use crate::db::{open_shared, SharedConnection};
use crate::domain::schema::SchemaRegistry;

/// 应用状态
///
/// 所有 API 共享同一个连接与 schema 注册表
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享连接
    pub conn: SharedConnection,

    /// 导入/回滚/账本 API
    pub import_api: Arc<ImportApi>,

    /// 人工实体维护 API
    pub entity_api: Arc<EntityApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并幂等建表
    /// 2. 构建内置 schema 注册表
    /// 3. 创建所有API实例
    pub fn new(db_path: String) -> ApiResult<Self> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_shared(&db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(format!("无法打开数据库: {}", e)))?;
        let registry = Arc::new(SchemaRegistry::builtin()?);

        let import_api = Arc::new(ImportApi::new(conn.clone(), registry.clone())?);
        let entity_api = Arc::new(EntityApi::new(conn.clone(), registry));

        tracing::info!("AppState初始化成功");
        Ok(Self {
            db_path,
            conn,
            import_api,
            entity_api,
        })
    }
}
