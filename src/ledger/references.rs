// ==========================================
// 批量导入与回滚账本 - 实体引用推导
// ==========================================
// 由实体快照中的引用字段推导 entity_reference 行
// ==========================================

use crate::domain::entity::EntityReference;
use crate::domain::schema::{DomainSchema, SchemaError, SchemaRegistry};
use serde_json::Value as JsonValue;

/// 从 JSON 快照推导出向引用（空值/null 跳过）
pub fn derive_references(
    schema: &DomainSchema,
    registry: &SchemaRegistry,
    entity_id: &str,
    payload: &JsonValue,
) -> Result<Vec<EntityReference>, SchemaError> {
    let mut references = Vec::new();
    for field in schema.reference_fields() {
        let Some(target_domain) = field.references else {
            continue;
        };
        let target_id = match payload.get(&field.key) {
            Some(JsonValue::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => continue,
        };
        references.push(EntityReference {
            source_type: schema.entity_type.clone(),
            source_id: entity_id.to_string(),
            field_key: field.key.clone(),
            target_type: registry.get(target_domain)?.entity_type.clone(),
            target_id,
        });
    }
    Ok(references)
}
