use super::core::ImportBatchRepository;
use crate::domain::import::{ChangeRecord, ImportBatch, RowOutcome};
use crate::domain::types::{Page, PageRequest};
use crate::repository::error::RepositoryResult;
use crate::repository::row_utils::{enum_column, opt_ts_column, ts_column};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use serde::{Deserialize, Serialize};

const BATCH_COLUMNS: &str = r#"
    batch_id, domain, file_name, submitted_by, submitted_at, status,
    total_rows, success_rows, fail_rows, finished_at, error_message,
    rolled_back_at, rolled_back_by
"#;

const CHANGE_COLUMNS: &str = r#"
    batch_id, sequence, change_seq, entity_type, entity_id, operation,
    prior_state_json, new_state_json, revision_after, created_at
"#;

/// 按状态统计的批次数量（仪表盘汇总）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatusCounts {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub rolled_back: usize,
    pub total_rows: usize,
    pub success_rows: usize,
    pub fail_rows: usize,
}

impl ImportBatchRepository {
    // ==========================================
    // 查询操作（事务内）
    // ==========================================

    pub fn find_batch_tx(conn: &Connection, batch_id: &str) -> RepositoryResult<Option<ImportBatch>> {
        let sql = format!("SELECT {} FROM import_batch WHERE batch_id = ?1", BATCH_COLUMNS);
        let batch = conn
            .query_row(&sql, params![batch_id], map_batch)
            .optional()?;
        Ok(batch)
    }

    /// 批次变更记录（按应用顺序）
    pub fn list_changes_tx(conn: &Connection, batch_id: &str) -> RepositoryResult<Vec<ChangeRecord>> {
        let sql = format!(
            "SELECT {} FROM import_change_record WHERE batch_id = ?1 ORDER BY sequence ASC",
            CHANGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let changes = stmt
            .query_map(params![batch_id], map_change)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(changes)
    }

    /// 查询在指定变更之后触碰同一实体、且仍为 completed 的其他批次
    pub fn later_completed_batches_tx(
        conn: &Connection,
        entity_type: &str,
        entity_id: &str,
        after_change_seq: i64,
        exclude_batch_id: &str,
    ) -> RepositoryResult<Vec<String>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT c.batch_id
            FROM import_change_record c
            JOIN import_batch b ON b.batch_id = c.batch_id
            WHERE c.entity_type = ?1 AND c.entity_id = ?2
              AND c.change_seq > ?3
              AND c.batch_id <> ?4
              AND b.status = 'completed'
            ORDER BY c.batch_id
            "#,
        )?;
        let ids = stmt
            .query_map(
                params![entity_type, entity_id, after_change_seq, exclude_batch_id],
                |row| row.get::<_, String>(0),
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(ids)
    }

    // ==========================================
    // 查询操作（独立）
    // ==========================================

    pub fn find_batch(&self, batch_id: &str) -> RepositoryResult<Option<ImportBatch>> {
        let conn = self.get_conn()?;
        Self::find_batch_tx(&conn, batch_id)
    }

    pub fn list_changes(&self, batch_id: &str) -> RepositoryResult<Vec<ChangeRecord>> {
        let conn = self.get_conn()?;
        Self::list_changes_tx(&conn, batch_id)
    }

    /// 批次行结果（按行序）
    pub fn list_outcomes(&self, batch_id: &str) -> RepositoryResult<Vec<RowOutcome>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT batch_id, row_index, outcome, reason, entity_id
            FROM import_row_outcome
            WHERE batch_id = ?1
            ORDER BY row_index ASC
            "#,
        )?;
        let outcomes = stmt
            .query_map(params![batch_id], map_outcome)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(outcomes)
    }

    /// 批次历史（最近优先）
    pub fn list_recent(&self, page: PageRequest) -> RepositoryResult<Page<ImportBatch>> {
        let conn = self.get_conn()?;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM import_batch", [], |row| row.get(0))?;

        let sql = format!(
            "SELECT {} FROM import_batch ORDER BY submitted_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
            BATCH_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![page.limit as i64, page.offset as i64], map_batch)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total as usize,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// 按状态汇总批次与行数
    pub fn status_counts(&self) -> RepositoryResult<BatchStatusCounts> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT status, COUNT(*), COALESCE(SUM(total_rows), 0),
                   COALESCE(SUM(success_rows), 0), COALESCE(SUM(fail_rows), 0)
            FROM import_batch
            GROUP BY status
            "#,
        )?;

        let mut counts = BatchStatusCounts::default();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        for row in rows {
            let (status, n, total, success, fail) = row?;
            match status.as_str() {
                "pending" => counts.pending = n as usize,
                "completed" => counts.completed = n as usize,
                "failed" => counts.failed = n as usize,
                "rolled_back" => counts.rolled_back = n as usize,
                _ => {}
            }
            counts.total_rows += total as usize;
            counts.success_rows += success as usize;
            counts.fail_rows += fail as usize;
        }
        Ok(counts)
    }
}

fn map_batch(row: &Row<'_>) -> SqliteResult<ImportBatch> {
    Ok(ImportBatch {
        batch_id: row.get(0)?,
        domain: enum_column(row, 1)?,
        file_name: row.get(2)?,
        submitted_by: row.get(3)?,
        submitted_at: ts_column(row, 4)?,
        status: enum_column(row, 5)?,
        total_rows: row.get::<_, i64>(6)? as usize,
        success_rows: row.get::<_, i64>(7)? as usize,
        fail_rows: row.get::<_, i64>(8)? as usize,
        finished_at: opt_ts_column(row, 9)?,
        error_message: row.get(10)?,
        rolled_back_at: opt_ts_column(row, 11)?,
        rolled_back_by: row.get(12)?,
    })
}

fn map_outcome(row: &Row<'_>) -> SqliteResult<RowOutcome> {
    Ok(RowOutcome {
        batch_id: row.get(0)?,
        row_index: row.get::<_, i64>(1)? as usize,
        outcome: enum_column(row, 2)?,
        reason: row.get(3)?,
        entity_id: row.get(4)?,
    })
}

fn map_change(row: &Row<'_>) -> SqliteResult<ChangeRecord> {
    Ok(ChangeRecord {
        batch_id: row.get(0)?,
        sequence: row.get::<_, i64>(1)? as usize,
        change_seq: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        operation: enum_column(row, 5)?,
        prior_state: row.get(6)?,
        new_state: row.get(7)?,
        revision_after: row.get(8)?,
        created_at: ts_column(row, 9)?,
    })
}
