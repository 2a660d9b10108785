use crate::db::SharedConnection;
use crate::domain::import::{BatchStatus, ChangeRecord, ImportBatch, RowOutcome};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::format_ts;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::MutexGuard;

// ==========================================
// ImportBatchRepository - 导入批次仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub struct ImportBatchRepository {
    conn: SharedConnection,
}

impl ImportBatchRepository {
    /// 创建新的导入批次仓储
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
    // 写入操作（事务内）
    // ==========================================

    /// 插入批次（执行开始时，状态 pending）
    pub fn insert_batch_tx(conn: &Connection, batch: &ImportBatch) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO import_batch (
                batch_id, domain, file_name, submitted_by, submitted_at, status,
                total_rows, success_rows, fail_rows, finished_at, error_message,
                rolled_back_at, rolled_back_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                batch.batch_id,
                batch.domain.as_str(),
                batch.file_name,
                batch.submitted_by,
                format_ts(&batch.submitted_at),
                batch.status.as_str(),
                batch.total_rows as i64,
                batch.success_rows as i64,
                batch.fail_rows as i64,
                batch.finished_at.as_ref().map(format_ts),
                batch.error_message,
                batch.rolled_back_at.as_ref().map(format_ts),
                batch.rolled_back_by,
            ],
        )?;
        Ok(())
    }

    /// 结束批次：pending → completed | failed
    #[allow(clippy::too_many_arguments)]
    pub fn finalize_batch_tx(
        conn: &Connection,
        batch_id: &str,
        status: BatchStatus,
        success_rows: usize,
        fail_rows: usize,
        finished_at: &DateTime<Utc>,
        error_message: Option<&str>,
    ) -> RepositoryResult<()> {
        if !BatchStatus::Pending.can_transition_to(status) {
            return Err(RepositoryError::InvalidStateTransition {
                from: BatchStatus::Pending.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        let rows = conn.execute(
            r#"
            UPDATE import_batch
            SET status = ?1, success_rows = ?2, fail_rows = ?3, finished_at = ?4, error_message = ?5
            WHERE batch_id = ?6 AND status = 'pending'
            "#,
            params![
                status.as_str(),
                success_rows as i64,
                fail_rows as i64,
                format_ts(finished_at),
                error_message,
                batch_id,
            ],
        )?;

        if rows == 0 {
            return Err(Self::transition_error(conn, batch_id, status)?);
        }
        Ok(())
    }

    /// 标记回滚：completed → rolled_back
    pub fn mark_rolled_back_tx(
        conn: &Connection,
        batch_id: &str,
        actor_id: &str,
        rolled_back_at: &DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"
            UPDATE import_batch
            SET status = 'rolled_back', rolled_back_at = ?1, rolled_back_by = ?2
            WHERE batch_id = ?3 AND status = 'completed'
            "#,
            params![format_ts(rolled_back_at), actor_id, batch_id],
        )?;

        if rows == 0 {
            return Err(Self::transition_error(conn, batch_id, BatchStatus::RolledBack)?);
        }
        Ok(())
    }

    fn transition_error(
        conn: &Connection,
        batch_id: &str,
        to: BatchStatus,
    ) -> RepositoryResult<RepositoryError> {
        Ok(match Self::find_batch_tx(conn, batch_id)? {
            Some(batch) => RepositoryError::InvalidStateTransition {
                from: batch.status.as_str().to_string(),
                to: to.as_str().to_string(),
            },
            None => RepositoryError::NotFound {
                entity: "ImportBatch".to_string(),
                id: batch_id.to_string(),
            },
        })
    }

    /// 插入行结果
    pub fn insert_outcome_tx(conn: &Connection, outcome: &RowOutcome) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO import_row_outcome (batch_id, row_index, outcome, reason, entity_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                outcome.batch_id,
                outcome.row_index as i64,
                outcome.outcome.as_str(),
                outcome.reason,
                outcome.entity_id,
            ],
        )?;
        Ok(())
    }

    /// 插入变更记录
    ///
    /// # 返回
    /// - Ok(change_seq): 全局变更序号
    pub fn insert_change_tx(conn: &Connection, change: &ChangeRecord) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO import_change_record (
                batch_id, sequence, entity_type, entity_id, operation,
                prior_state_json, new_state_json, revision_after, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                change.batch_id,
                change.sequence as i64,
                change.entity_type,
                change.entity_id,
                change.operation.as_str(),
                change.prior_state,
                change.new_state,
                change.revision_after,
                format_ts(&change.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}
