// ==========================================
// 批量导入与回滚账本 - 实体存储仓储
// ==========================================
// 对齐: entity_record / entity_reference 表
// 红线: Repository 不含业务规则，只做数据 CRUD
// 说明: `*_tx` 关联函数接收调用方已开启事务的连接，
//       由引擎层决定事务边界
// ==========================================

use crate::db::SharedConnection;
use crate::domain::entity::{EntityReference, EntitySnapshot};
use crate::domain::types::{Page, PageRequest};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_ts, ts_column};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::MutexGuard;

// ==========================================
// EntityRepository - 实体仓储
// ==========================================
pub struct EntityRepository {
    conn: SharedConnection,
}

impl EntityRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 按自然键读取实体当前快照
    pub fn find_tx(
        conn: &Connection,
        entity_type: &str,
        entity_id: &str,
    ) -> RepositoryResult<Option<EntitySnapshot>> {
        let snapshot = conn
            .query_row(
                r#"
                SELECT entity_type, entity_id, payload_json, revision, last_batch_id,
                       created_at, updated_at
                FROM entity_record
                WHERE entity_type = ?1 AND entity_id = ?2
                "#,
                params![entity_type, entity_id],
                map_snapshot,
            )
            .optional()?;
        Ok(snapshot)
    }

    /// 新建实体（修订号从 1 开始）
    pub fn insert_tx(
        conn: &Connection,
        entity_type: &str,
        entity_id: &str,
        payload_json: &str,
        batch_id: Option<&str>,
        now: &DateTime<Utc>,
    ) -> RepositoryResult<EntitySnapshot> {
        let ts = format_ts(now);
        conn.execute(
            r#"
            INSERT INTO entity_record (
                entity_type, entity_id, payload_json, revision, last_batch_id,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, 1, ?4, ?5, ?5)
            "#,
            params![entity_type, entity_id, payload_json, batch_id, ts],
        )?;

        Ok(EntitySnapshot {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            payload_json: payload_json.to_string(),
            revision: 1,
            last_batch_id: batch_id.map(str::to_string),
            created_at: *now,
            updated_at: *now,
        })
    }

    /// 覆盖实体快照（乐观锁：revision 必须等于 expected_revision）
    ///
    /// # 返回
    /// - Ok(new_revision)
    /// - Err(OptimisticLockFailure): 读取后被其他写入修改
    pub fn update_tx(
        conn: &Connection,
        entity_type: &str,
        entity_id: &str,
        payload_json: &str,
        expected_revision: i64,
        batch_id: Option<&str>,
        now: &DateTime<Utc>,
    ) -> RepositoryResult<i64> {
        let rows = conn.execute(
            r#"
            UPDATE entity_record
            SET payload_json = ?1, revision = revision + 1, last_batch_id = ?2, updated_at = ?3
            WHERE entity_type = ?4 AND entity_id = ?5 AND revision = ?6
            "#,
            params![
                payload_json,
                batch_id,
                format_ts(now),
                entity_type,
                entity_id,
                expected_revision
            ],
        )?;

        if rows == 0 {
            let actual = Self::find_tx(conn, entity_type, entity_id)?
                .map(|s| s.revision)
                .unwrap_or(0);
            return Err(RepositoryError::OptimisticLockFailure {
                entity: format!("{}:{}", entity_type, entity_id),
                expected: expected_revision,
                actual,
            });
        }

        Ok(expected_revision + 1)
    }

    /// 删除实体及其出向引用
    pub fn delete_tx(conn: &Connection, entity_type: &str, entity_id: &str) -> RepositoryResult<bool> {
        conn.execute(
            "DELETE FROM entity_reference WHERE source_type = ?1 AND source_id = ?2",
            params![entity_type, entity_id],
        )?;
        let rows = conn.execute(
            "DELETE FROM entity_record WHERE entity_type = ?1 AND entity_id = ?2",
            params![entity_type, entity_id],
        )?;
        Ok(rows > 0)
    }

    /// 以新集合替换实体的出向引用
    pub fn replace_references_tx(
        conn: &Connection,
        source_type: &str,
        source_id: &str,
        references: &[EntityReference],
    ) -> RepositoryResult<()> {
        conn.execute(
            "DELETE FROM entity_reference WHERE source_type = ?1 AND source_id = ?2",
            params![source_type, source_id],
        )?;

        let mut stmt = conn.prepare(
            r#"
            INSERT INTO entity_reference (source_type, source_id, field_key, target_type, target_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        for r in references {
            stmt.execute(params![
                r.source_type,
                r.source_id,
                r.field_key,
                r.target_type,
                r.target_id
            ])?;
        }
        Ok(())
    }

    /// 查询引用指定实体的依赖记录（排除自引用）
    pub fn find_dependents_tx(
        conn: &Connection,
        target_type: &str,
        target_id: &str,
    ) -> RepositoryResult<Vec<EntityReference>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT source_type, source_id, field_key, target_type, target_id
            FROM entity_reference
            WHERE target_type = ?1 AND target_id = ?2
              AND NOT (source_type = target_type AND source_id = target_id)
            ORDER BY source_type, source_id
            "#,
        )?;

        let refs = stmt
            .query_map(params![target_type, target_id], map_reference)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(refs)
    }

    // ==========================================
    // 独立查询（自行加锁）
    // ==========================================

    pub fn find(&self, entity_type: &str, entity_id: &str) -> RepositoryResult<Option<EntitySnapshot>> {
        let conn = self.get_conn()?;
        Self::find_tx(&conn, entity_type, entity_id)
    }

    pub fn find_dependents(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> RepositoryResult<Vec<EntityReference>> {
        let conn = self.get_conn()?;
        Self::find_dependents_tx(&conn, entity_type, entity_id)
    }

    /// 按实体类型分页列出（按自然键排序）
    pub fn list_by_type(
        &self,
        entity_type: &str,
        page: PageRequest,
    ) -> RepositoryResult<Page<EntitySnapshot>> {
        let conn = self.get_conn()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entity_record WHERE entity_type = ?1",
            params![entity_type],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            r#"
            SELECT entity_type, entity_id, payload_json, revision, last_batch_id,
                   created_at, updated_at
            FROM entity_record
            WHERE entity_type = ?1
            ORDER BY entity_id
            LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let items = stmt
            .query_map(
                params![entity_type, page.limit as i64, page.offset as i64],
                map_snapshot,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total as usize,
            limit: page.limit,
            offset: page.offset,
        })
    }
}

fn map_snapshot(row: &Row<'_>) -> SqliteResult<EntitySnapshot> {
    Ok(EntitySnapshot {
        entity_type: row.get(0)?,
        entity_id: row.get(1)?,
        payload_json: row.get(2)?,
        revision: row.get(3)?,
        last_batch_id: row.get(4)?,
        created_at: ts_column(row, 5)?,
        updated_at: ts_column(row, 6)?,
    })
}

fn map_reference(row: &Row<'_>) -> SqliteResult<EntityReference> {
    Ok(EntityReference {
        source_type: row.get(0)?,
        source_id: row.get(1)?,
        field_key: row.get(2)?,
        target_type: row.get(3)?,
        target_id: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;

    fn product_ref(source: &str, target: &str) -> EntityReference {
        EntityReference {
            source_type: "delivery_guide".to_string(),
            source_id: source.to_string(),
            field_key: "product_code".to_string(),
            target_type: "product".to_string(),
            target_id: target.to_string(),
        }
    }

    #[test]
    fn test_insert_update_find() {
        let shared = open_in_memory_shared().unwrap();
        let repo = EntityRepository::new(shared.clone());
        let now = Utc::now();
        {
            let conn = shared.lock().unwrap();
            EntityRepository::insert_tx(&conn, "product", "SKU-1", r#"{"stock":1}"#, Some("b1"), &now)
                .unwrap();
            let rev =
                EntityRepository::update_tx(&conn, "product", "SKU-1", r#"{"stock":2}"#, 1, None, &now)
                    .unwrap();
            assert_eq!(rev, 2);
        }

        let found = repo.find("product", "SKU-1").unwrap().unwrap();
        assert_eq!(found.revision, 2);
        assert_eq!(found.payload_json, r#"{"stock":2}"#);
        assert_eq!(found.last_batch_id, None);
    }

    #[test]
    fn test_update_with_stale_revision_fails() {
        let shared = open_in_memory_shared().unwrap();
        let now = Utc::now();
        let conn = shared.lock().unwrap();
        EntityRepository::insert_tx(&conn, "product", "SKU-1", "{}", None, &now).unwrap();

        let result = EntityRepository::update_tx(&conn, "product", "SKU-1", "{}", 7, None, &now);
        assert!(matches!(
            result,
            Err(RepositoryError::OptimisticLockFailure { expected: 7, actual: 1, .. })
        ));
    }

    #[test]
    fn test_dependents_and_delete() {
        let shared = open_in_memory_shared().unwrap();
        let repo = EntityRepository::new(shared.clone());
        let now = Utc::now();
        {
            let conn = shared.lock().unwrap();
            EntityRepository::insert_tx(&conn, "product", "SKU-1", "{}", None, &now).unwrap();
            EntityRepository::insert_tx(&conn, "delivery_guide", "G-1", "{}", None, &now).unwrap();
            EntityRepository::replace_references_tx(
                &conn,
                "delivery_guide",
                "G-1",
                &[product_ref("G-1", "SKU-1")],
            )
            .unwrap();
        }

        let deps = repo.find_dependents("product", "SKU-1").unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].source_id, "G-1");

        {
            let conn = shared.lock().unwrap();
            assert!(EntityRepository::delete_tx(&conn, "delivery_guide", "G-1").unwrap());
        }
        assert!(repo.find_dependents("product", "SKU-1").unwrap().is_empty());
    }

    #[test]
    fn test_list_by_type_paged() {
        let shared = open_in_memory_shared().unwrap();
        let repo = EntityRepository::new(shared.clone());
        let now = Utc::now();
        {
            let conn = shared.lock().unwrap();
            for id in ["A", "B", "C"] {
                EntityRepository::insert_tx(&conn, "product", id, "{}", None, &now).unwrap();
            }
        }

        let page = repo.list_by_type("product", PageRequest::new(2, 1)).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(
            page.items.iter().map(|e| e.entity_id.as_str()).collect::<Vec<_>>(),
            vec!["B", "C"]
        );
    }
}
