// ==========================================
// 批量导入与回滚账本 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::{ConfigResult, ImportConfigReader};
use crate::db::{open_shared, SharedConnection};
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 环境变量: 显式指定数据库路径
pub const DB_PATH_ENV: &str = "IMPORT_LEDGER_DB_PATH";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: SharedConnection,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例（自动建表）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_shared(db_path)?;
        Ok(Self { conn })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: SharedConnection) -> ConfigResult<Self> {
        {
            let guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global 配置（UPSERT）
    pub fn set_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self
            .get_global_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 获取 global 配置快照（JSON）
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 解析数值型配置，格式错误时回退默认值并告警
    fn parse_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: std::str::FromStr + Copy + std::fmt::Display,
    {
        let raw = self.get_config_or_default(key, &default.to_string())?;
        Ok(raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
            default
        }))
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_max_rows_per_batch(&self) -> ConfigResult<usize> {
        let value = self.parse_or_default(config_keys::MAX_ROWS_PER_BATCH, defaults::MAX_ROWS_PER_BATCH)?;
        Ok(value.max(1))
    }

    async fn get_max_page_size(&self) -> ConfigResult<usize> {
        let value = self.parse_or_default(config_keys::MAX_PAGE_SIZE, defaults::MAX_PAGE_SIZE)?;
        Ok(value.max(1))
    }

    async fn get_allow_degraded_rollback(&self) -> ConfigResult<bool> {
        self.parse_or_default(config_keys::ALLOW_DEGRADED_ROLLBACK, defaults::ALLOW_DEGRADED_ROLLBACK)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 单批次最大行数
    pub const MAX_ROWS_PER_BATCH: &str = "import.max_rows_per_batch";
    // 分页上限
    pub const MAX_PAGE_SIZE: &str = "ledger.max_page_size";
    // 存在降级项时是否仍允许回滚
    pub const ALLOW_DEGRADED_ROLLBACK: &str = "rollback.allow_degraded";
}

pub mod defaults {
    pub const MAX_ROWS_PER_BATCH: usize = 10_000;
    pub const MAX_PAGE_SIZE: usize = 100;
    pub const ALLOW_DEGRADED_ROLLBACK: bool = true;
}

/// 默认数据库路径
///
/// 顺序: 环境变量 → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./import_ledger.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("import-ledger");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("import_ledger.db");
        }
    }

    path.to_string_lossy().to_string()
}
