// ==========================================
// 批量导入与回滚账本 - 实体 API
// ==========================================
// 职责: 人工新建/修改/删除业务实体，实体查询
// 红线: 每次人工写操作追加一条审计（与写入同一事务）
// 红线: 仍被引用的实体不允许删除
// ==========================================

use std::collections::HashSet;
use std::sync::{Arc, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::{json, Value as JsonValue};
use tracing::{info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::db::SharedConnection;
use crate::domain::audit::{AuditAction, AuditEntry};
use crate::domain::entity::{EntityRef, EntityReference, EntitySnapshot};
use crate::domain::import::{CanonicalRecord, CellValue, FieldValue, RawRow};
use crate::domain::schema::{DomainSchema, ImportDomain, SchemaRegistry};
use crate::domain::types::{Page, PageRequest};
use crate::importer::{coerce_cell, join_row_errors, DqValidator};
use crate::ledger::derive_references;
use crate::repository::{AuditLogRepository, EntityRepository, RepositoryError};

// ==========================================
// EntityApi - 实体 API
// ==========================================
pub struct EntityApi {
    conn: SharedConnection,
    registry: Arc<SchemaRegistry>,
    entity_repo: EntityRepository,
}

impl EntityApi {
    pub fn new(conn: SharedConnection, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            entity_repo: EntityRepository::new(conn.clone()),
            conn,
            registry,
        }
    }

    fn get_conn(&self) -> ApiResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()).into())
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get(&self, domain: ImportDomain, entity_id: &str) -> ApiResult<Option<EntitySnapshot>> {
        let schema = self.registry.get(domain)?;
        Ok(self.entity_repo.find(&schema.entity_type, entity_id)?)
    }

    pub fn list(&self, domain: ImportDomain, page: PageRequest) -> ApiResult<Page<EntitySnapshot>> {
        let schema = self.registry.get(domain)?;
        Ok(self.entity_repo.list_by_type(&schema.entity_type, page)?)
    }

    // ==========================================
    // 人工写操作
    // ==========================================

    /// 人工新建实体
    ///
    /// # 参数
    /// - domain: 导入域
    /// - actor_id: 操作人
    /// - values: 字段键 → 单元格值（与导入走同一套类型转换与校验）
    ///
    /// # 返回
    /// - Ok(EntitySnapshot): 新实体（revision=1）
    /// - Err(BusinessRuleViolation): 自然键已存在 / 引用不存在
    #[instrument(skip(self, values), fields(domain = %domain, actor_id = %actor_id))]
    pub fn create(&self, domain: ImportDomain, actor_id: &str, values: &RawRow) -> ApiResult<EntitySnapshot> {
        let schema = self.registry.get(domain)?;
        let record = build_record(schema, values)?;
        let entity_id = natural_key(schema, &record)?;
        let payload = record.to_payload_json();

        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(RepositoryError::from)?;

        if EntityRepository::find_tx(&tx, &schema.entity_type, &entity_id)?.is_some() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "{}:{} 已存在",
                schema.entity_type, entity_id
            )));
        }
        let references = self.resolve_references(&tx, schema, &entity_id, &payload)?;

        let now = Utc::now();
        let snapshot =
            EntityRepository::insert_tx(&tx, &schema.entity_type, &entity_id, &payload, None, &now)?;
        EntityRepository::replace_references_tx(&tx, &schema.entity_type, &entity_id, &references)?;

        let entry = AuditEntry::new(
            actor_id,
            AuditAction::EntityCreated,
            &schema.entity_type,
            Some(&entity_id),
            format!("人工新建 {}:{}", schema.entity_type, entity_id),
        )
        .with_payload(json!({ "new_state": parse_json(&payload) }));
        AuditLogRepository::insert_tx(&tx, &entry)?;
        tx.commit().map_err(RepositoryError::from)?;

        info!(entity_id = %entity_id, "实体已人工新建");
        Ok(snapshot)
    }

    /// 人工修改实体（只覆盖传入的字段）
    ///
    /// # 参数
    /// - expected_revision: 调用方读到的修订号；None 表示以当前修订号为准
    ///
    /// # 返回
    /// - Err(OptimisticLockFailure): 修订号不一致
    /// - Err(InvalidInput): 试图修改自然键
    #[instrument(skip(self, values), fields(domain = %domain, entity_id = %entity_id, actor_id = %actor_id))]
    pub fn update(
        &self,
        domain: ImportDomain,
        actor_id: &str,
        entity_id: &str,
        values: &RawRow,
        expected_revision: Option<i64>,
    ) -> ApiResult<EntitySnapshot> {
        let schema = self.registry.get(domain)?;

        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(RepositoryError::from)?;

        let existing = EntityRepository::find_tx(&tx, &schema.entity_type, entity_id)?
            .ok_or_else(|| ApiError::NotFound(format!("{}:{} 不存在", schema.entity_type, entity_id)))?;
        let expected = expected_revision.unwrap_or(existing.revision);

        // 以现有快照为底合并传入字段，再走完整校验
        let mut merged = snapshot_to_row(&existing);
        for (key, value) in values {
            merged.insert(key.clone(), value.clone());
        }
        let record = build_record(schema, &merged)?;
        if natural_key(schema, &record)? != entity_id {
            return Err(ApiError::InvalidInput(format!(
                "自然键 {} 不允许修改",
                schema.natural_key
            )));
        }
        let payload = record.to_payload_json();
        let references = self.resolve_references(&tx, schema, entity_id, &payload)?;

        let now = Utc::now();
        let revision =
            EntityRepository::update_tx(&tx, &schema.entity_type, entity_id, &payload, expected, None, &now)?;
        EntityRepository::replace_references_tx(&tx, &schema.entity_type, entity_id, &references)?;

        let entry = AuditEntry::new(
            actor_id,
            AuditAction::EntityUpdated,
            &schema.entity_type,
            Some(entity_id),
            format!("人工修改 {}:{} (revision {})", schema.entity_type, entity_id, revision),
        )
        .with_payload(json!({
            "prior_state": parse_json(&existing.payload_json),
            "new_state": parse_json(&payload),
        }));
        AuditLogRepository::insert_tx(&tx, &entry)?;

        let snapshot = EntityRepository::find_tx(&tx, &schema.entity_type, entity_id)?.ok_or_else(|| {
            ApiError::NotFound(format!("{}:{} 不存在", schema.entity_type, entity_id))
        })?;
        tx.commit().map_err(RepositoryError::from)?;

        info!(revision, "实体已人工修改");
        Ok(snapshot)
    }

    /// 人工删除实体
    ///
    /// # 返回
    /// - Err(BusinessRuleViolation): 仍被其他实体引用
    #[instrument(skip(self), fields(domain = %domain, entity_id = %entity_id, actor_id = %actor_id))]
    pub fn delete(&self, domain: ImportDomain, actor_id: &str, entity_id: &str) -> ApiResult<()> {
        let schema = self.registry.get(domain)?;
        let entity = EntityRef::new(&schema.entity_type, entity_id);

        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(RepositoryError::from)?;

        let existing = EntityRepository::find_tx(&tx, &schema.entity_type, entity_id)?
            .ok_or_else(|| ApiError::NotFound(format!("{} 不存在", entity)))?;

        let dependents: Vec<String> = EntityRepository::find_dependents_tx(&tx, &schema.entity_type, entity_id)?
            .iter()
            .map(|d| EntityRef::new(&d.source_type, &d.source_id))
            .filter(|d| *d != entity)
            .map(|d| d.to_string())
            .collect();
        if !dependents.is_empty() {
            warn!(dependents = dependents.len(), "实体仍被引用，拒绝删除");
            return Err(ApiError::BusinessRuleViolation(format!(
                "{} 仍被引用: {}",
                entity,
                dependents.join(", ")
            )));
        }

        EntityRepository::delete_tx(&tx, &schema.entity_type, entity_id)?;
        let audit = AuditEntry::new(
            actor_id,
            AuditAction::EntityDeleted,
            &schema.entity_type,
            Some(entity_id),
            format!("人工删除 {}", entity),
        )
        .with_payload(json!({ "prior_state": parse_json(&existing.payload_json) }));
        AuditLogRepository::insert_tx(&tx, &audit)?;
        tx.commit().map_err(RepositoryError::from)?;

        info!("实体已人工删除");
        Ok(())
    }

    /// 引用字段必须指向已存在的实体（自引用除外）
    fn resolve_references(
        &self,
        tx: &Transaction<'_>,
        schema: &DomainSchema,
        entity_id: &str,
        payload: &str,
    ) -> ApiResult<Vec<EntityReference>> {
        let references = derive_references(schema, &self.registry, entity_id, &parse_json(payload))?;
        for reference in &references {
            let self_reference =
                reference.target_type == schema.entity_type && reference.target_id == entity_id;
            if !self_reference
                && EntityRepository::find_tx(tx, &reference.target_type, &reference.target_id)?.is_none()
            {
                return Err(ApiError::BusinessRuleViolation(format!(
                    "引用不存在 (字段 {}): {}:{}",
                    reference.field_key, reference.target_type, reference.target_id
                )));
            }
        }
        Ok(references)
    }
}

/// 字段键 → 单元格值 转为标准记录（类型转换 + 业务校验）
fn build_record(schema: &DomainSchema, values: &RawRow) -> ApiResult<CanonicalRecord> {
    let known: HashSet<&str> = schema.fields.iter().map(|f| f.key.as_str()).collect();
    let mut unknown: Vec<&str> = values
        .keys()
        .map(String::as_str)
        .filter(|k| !known.contains(k))
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(ApiError::InvalidInput(format!("未知字段: {}", unknown.join(", "))));
    }

    let mut record = CanonicalRecord::default();
    let mut errors = Vec::new();
    for field in &schema.fields {
        let cell = values.get(&field.key).unwrap_or(&CellValue::Empty);
        match coerce_cell(cell, field) {
            Ok(value) => {
                record.fields.insert(field.key.clone(), value);
            }
            Err(e) => errors.push(e),
        }
    }
    errors.extend(DqValidator::new(schema).validate(&record));

    if errors.is_empty() {
        Ok(record)
    } else {
        Err(ApiError::ValidationError(join_row_errors(&errors)))
    }
}

fn natural_key(schema: &DomainSchema, record: &CanonicalRecord) -> ApiResult<String> {
    record
        .get(&schema.natural_key)
        .and_then(FieldValue::as_key_text)
        .ok_or_else(|| ApiError::ValidationError(format!("必填字段为空: {}", schema.natural_key)))
}

/// 快照 JSON → 单元格（供合并后重新校验）
fn snapshot_to_row(snapshot: &EntitySnapshot) -> RawRow {
    let mut row = RawRow::new();
    if let JsonValue::Object(map) = snapshot.payload() {
        for (key, value) in map {
            let cell = match value {
                JsonValue::String(s) => CellValue::Text(s),
                JsonValue::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Empty),
                JsonValue::Bool(b) => CellValue::Bool(b),
                _ => CellValue::Empty,
            };
            row.insert(key, cell);
        }
    }
    row
}

fn parse_json(payload: &str) -> JsonValue {
    serde_json::from_str(payload).unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;
    use crate::domain::audit::AuditFilter;

    fn setup() -> (SharedConnection, EntityApi) {
        let shared = open_in_memory_shared().unwrap();
        let registry = Arc::new(SchemaRegistry::builtin().unwrap());
        (shared.clone(), EntityApi::new(shared, registry))
    }

    fn values(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), CellValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_create_update_delete_each_audited() {
        let (shared, api) = setup();
        let created = api
            .create(
                ImportDomain::Products,
                "alice",
                &values(&[("code", "SKU-1"), ("name", "Apple"), ("price", "1.50"), ("stock", "10")]),
            )
            .unwrap();
        assert_eq!(created.revision, 1);

        let updated = api
            .update(ImportDomain::Products, "alice", "SKU-1", &values(&[("stock", "12")]), Some(1))
            .unwrap();
        assert_eq!(updated.revision, 2);
        assert_eq!(updated.payload()["stock"], json!(12));
        assert_eq!(updated.payload()["name"], json!("Apple"));

        api.delete(ImportDomain::Products, "alice", "SKU-1").unwrap();
        assert!(api.get(ImportDomain::Products, "SKU-1").unwrap().is_none());

        let audit = AuditLogRepository::new(shared)
            .list(&AuditFilter::default(), PageRequest::default())
            .unwrap();
        let actions: Vec<&str> = audit.items.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["ENTITY_DELETED", "ENTITY_UPDATED", "ENTITY_CREATED"]);
    }

    #[test]
    fn test_stale_revision_rejected() {
        let (_, api) = setup();
        api.create(
            ImportDomain::Products,
            "alice",
            &values(&[("code", "SKU-1"), ("name", "Apple"), ("price", "1")]),
        )
        .unwrap();
        let result = api.update(ImportDomain::Products, "bob", "SKU-1", &values(&[("price", "2")]), Some(7));
        assert!(matches!(result, Err(ApiError::OptimisticLockFailure(_))));
    }

    #[test]
    fn test_delete_referenced_entity_rejected() {
        let (_, api) = setup();
        api.create(
            ImportDomain::Products,
            "alice",
            &values(&[("code", "SKU-1"), ("name", "Apple"), ("price", "1")]),
        )
        .unwrap();
        api.create(
            ImportDomain::DeliveryGuides,
            "alice",
            &values(&[
                ("guide_number", "G-1"),
                ("date", "2025-01-20"),
                ("product_code", "SKU-1"),
                ("quantity", "3"),
            ]),
        )
        .unwrap();

        let result = api.delete(ImportDomain::Products, "alice", "SKU-1");
        assert!(matches!(result, Err(ApiError::BusinessRuleViolation(msg)) if msg.contains("delivery_guide:G-1")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let (_, api) = setup();
        let bad = api.create(
            ImportDomain::Products,
            "alice",
            &values(&[("code", "SKU-1"), ("name", "Apple"), ("price", "12,50")]),
        );
        assert!(matches!(bad, Err(ApiError::ValidationError(_))));

        let unknown = api.create(
            ImportDomain::Products,
            "alice",
            &values(&[("code", "SKU-1"), ("colour", "red")]),
        );
        assert!(matches!(unknown, Err(ApiError::InvalidInput(_))));

        let dangling = api.create(
            ImportDomain::DeliveryGuides,
            "alice",
            &values(&[
                ("guide_number", "G-1"),
                ("date", "2025-01-20"),
                ("product_code", "NOPE"),
                ("quantity", "1"),
            ]),
        );
        assert!(matches!(dangling, Err(ApiError::BusinessRuleViolation(_))));
    }
}
