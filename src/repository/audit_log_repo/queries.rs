use super::core::AuditLogRepository;
use crate::domain::audit::{AuditEntry, AuditFilter};
use crate::domain::types::{Page, PageRequest};
use crate::repository::error::RepositoryResult;
use crate::repository::row_utils::ts_column;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Result as SqliteResult, Row};

const AUDIT_COLUMNS: &str = r#"
    entry_id, actor_id, action, entity_type, entity_id,
    description, payload_json, created_at
"#;

impl AuditLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 entry_id 查询单条审计
    pub fn find_by_id(&self, entry_id: &str) -> RepositoryResult<Option<AuditEntry>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM audit_log WHERE entry_id = ?1", AUDIT_COLUMNS);
        let entry = conn
            .query_row(&sql, params![entry_id], map_row)
            .optional()?;
        Ok(entry)
    }

    /// 分页查询审计流（最近优先，可按操作人/实体过滤）
    pub fn list(&self, filter: &AuditFilter, page: PageRequest) -> RepositoryResult<Page<AuditEntry>> {
        let conn = self.get_conn()?;

        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if let Some(actor) = &filter.actor_id {
            clauses.push("actor_id = ?");
            values.push(SqlValue::Text(actor.clone()));
        }
        if let Some(entity_type) = &filter.entity_type {
            clauses.push("entity_type = ?");
            values.push(SqlValue::Text(entity_type.clone()));
        }
        if let Some(entity_id) = &filter.entity_id {
            clauses.push("entity_id = ?");
            values.push(SqlValue::Text(entity_id.clone()));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM audit_log {}", where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM audit_log {} ORDER BY seq DESC LIMIT ? OFFSET ?",
            AUDIT_COLUMNS, where_sql
        );
        let mut paged = values.clone();
        paged.push(SqlValue::Integer(page.limit as i64));
        paged.push(SqlValue::Integer(page.offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(paged.iter()), map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total as usize,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// 查询某操作人的全部审计（最近优先）
    pub fn find_by_actor(&self, actor_id: &str) -> RepositoryResult<Vec<AuditEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM audit_log WHERE actor_id = ?1 ORDER BY seq DESC",
            AUDIT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![actor_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }

    /// 查询某实体的全部审计（最近优先）
    pub fn find_by_entity(&self, entity_type: &str, entity_id: &str) -> RepositoryResult<Vec<AuditEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM audit_log WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY seq DESC",
            AUDIT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![entity_type, entity_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }
}

fn map_row(row: &Row<'_>) -> SqliteResult<AuditEntry> {
    let payload: Option<String> = row.get(6)?;
    Ok(AuditEntry {
        entry_id: row.get(0)?,
        actor_id: row.get(1)?,
        action: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        description: row.get(5)?,
        payload_json: payload.and_then(|s| serde_json::from_str(&s).ok()),
        timestamp: ts_column(row, 7)?,
    })
}
