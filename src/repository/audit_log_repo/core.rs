use crate::db::SharedConnection;
use crate::domain::audit::AuditEntry;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::format_ts;
use rusqlite::{params, Connection};
use std::sync::MutexGuard;

// ==========================================
// AuditLogRepository - 审计日志仓储
// ==========================================
// 红线: 只追加，不提供更新/删除（表上有触发器兜底）
pub struct AuditLogRepository {
    conn: SharedConnection,
}

impl AuditLogRepository {
    /// 创建新的审计日志仓储
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入审计条目
    ///
    /// # 参数
    /// - `entry`: 审计条目
    ///
    /// # 返回
    /// - `Ok(entry_id)`: 成功插入
    /// - `Err(...)`: 数据库错误
    pub fn insert(&self, entry: &AuditEntry) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, entry)
    }

    /// 在调用方事务内插入审计条目（与业务写入同提交）
    pub fn insert_tx(conn: &Connection, entry: &AuditEntry) -> RepositoryResult<String> {
        conn.execute(
            r#"
            INSERT INTO audit_log (
                entry_id, actor_id, action, entity_type, entity_id,
                description, payload_json, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                entry.entry_id,
                entry.actor_id,
                entry.action,
                entry.entity_type,
                entry.entity_id,
                entry.description,
                entry.payload_json.as_ref().map(|v| v.to_string()),
                format_ts(&entry.timestamp),
            ],
        )?;

        Ok(entry.entry_id.clone())
    }
}
