// ==========================================
// 批量导入与回滚账本 - 列映射引擎
// ==========================================
// 职责: 原始表头 → 标准字段 的建议映射、人工改映射、完整性校验
// 红线: 纯函数，无 I/O，同输入同输出
// ==========================================
// 匹配规则:
// - 表头与词项（字段键 + 别名）均归一化：小写 + 去除非字母数字字符
// - 双向子串包含即为候选
// - 与词项完全相等优先；其次特异度 = 命中词项的归一化长度；再按字段声明顺序
// - 按文件顺序分配，字段键互斥
// ==========================================

use crate::domain::import::RawRow;
use crate::domain::mapping::{ColumnMapping, MappingStatus, MappingValidation, RawColumn};
use crate::domain::schema::DomainSchema;
use crate::mapping::error::{MappingError, MappingResult};
use std::collections::HashSet;

/// 预览样本默认行数
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

/// 表头归一化
pub fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// 某表头在 schema 中的候选字段（按优先级排序）
///
/// # 返回
/// - Vec<(字段下标, 排序键)>：完全相等优先，其次特异度降序，最后按声明顺序
fn rank_candidates(header: &str, schema: &DomainSchema) -> Vec<(usize, (bool, usize))> {
    let normalized = normalize_header(header);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut candidates: Vec<(usize, (bool, usize))> = schema
        .fields
        .iter()
        .enumerate()
        .filter_map(|(idx, field)| {
            field
                .match_terms()
                .map(normalize_header)
                .filter(|term| {
                    !term.is_empty() && (normalized.contains(term.as_str()) || term.contains(&normalized))
                })
                .map(|term| (term == normalized, term.chars().count()))
                .max()
                .map(|rank| (idx, rank))
        })
        .collect();

    candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    candidates
}

/// 生成建议映射
///
/// # 参数
/// - raw_headers: 文件表头（文件顺序）
/// - schema: 目标导入域
///
/// # 返回
/// - 与 raw_headers 一一对应的 ColumnMapping
pub fn propose(raw_headers: &[String], schema: &DomainSchema) -> Vec<ColumnMapping> {
    let mut taken: HashSet<usize> = HashSet::new();

    raw_headers
        .iter()
        .map(|header| {
            let candidates = rank_candidates(header, schema);
            if candidates.is_empty() {
                return ColumnMapping::extra(header);
            }

            match candidates.iter().find(|(idx, _)| !taken.contains(idx)) {
                Some(&(idx, _)) => {
                    taken.insert(idx);
                    ColumnMapping::matched(header, &schema.fields[idx].key)
                }
                None => ColumnMapping::unmapped(header),
            }
        })
        .collect()
}

/// 人工改映射
///
/// # 参数
/// - raw_header: 目标表头
/// - new_field_key: 新字段键；None 表示清除
///
/// # 说明
/// - 新字段若被其他列持有，原持有列变为 unmapped
pub fn remap(
    mappings: &mut [ColumnMapping],
    schema: &DomainSchema,
    raw_header: &str,
    new_field_key: Option<&str>,
) -> MappingResult<()> {
    let target = mappings
        .iter()
        .position(|m| m.raw_header == raw_header)
        .ok_or_else(|| MappingError::UnknownHeader(raw_header.to_string()))?;

    let Some(key) = new_field_key else {
        mappings[target] = ColumnMapping::unmapped(raw_header);
        return Ok(());
    };

    if schema.field(key).is_none() {
        return Err(MappingError::UnknownField {
            domain: schema.domain.as_str().to_string(),
            key: key.to_string(),
        });
    }

    for (idx, mapping) in mappings.iter_mut().enumerate() {
        if idx != target && mapping.mapped_field_key.as_deref() == Some(key) {
            *mapping = ColumnMapping::unmapped(&mapping.raw_header);
        }
    }
    mappings[target] = ColumnMapping::matched(raw_header, key);
    Ok(())
}

/// 映射完整性校验（纯函数，不会失败）
///
/// 必填字段恰好被一个 match 状态的列持有才计为已映射
pub fn validate(mappings: &[ColumnMapping], schema: &DomainSchema) -> MappingValidation {
    let mut required_total = 0;
    let mut missing_required = Vec::new();

    for field in schema.required_fields() {
        required_total += 1;
        let holders = mappings
            .iter()
            .filter(|m| m.status == MappingStatus::Match)
            .filter(|m| m.mapped_field_key.as_deref() == Some(field.key.as_str()))
            .count();
        if holders != 1 {
            missing_required.push(field.key.clone());
        }
    }

    let required_mapped = required_total - missing_required.len();
    MappingValidation {
        required_total,
        required_mapped,
        is_valid: missing_required.is_empty(),
        missing_required,
    }
}

/// 由解码后的行生成 RawColumn（样本取前 sample_size 行的非空值）
pub fn build_raw_columns(headers: &[String], rows: &[RawRow], sample_size: usize) -> Vec<RawColumn> {
    headers
        .iter()
        .map(|header| RawColumn {
            header_text: header.clone(),
            sample_values: rows
                .iter()
                .take(sample_size)
                .filter_map(|row| row.get(header).and_then(|cell| cell.as_text()))
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::CellValue;
    use crate::domain::schema::{ImportDomain, SchemaRegistry};

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|h| h.to_string()).collect()
    }

    fn products() -> DomainSchema {
        SchemaRegistry::builtin()
            .unwrap()
            .get(ImportDomain::Products)
            .unwrap()
            .clone()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Product_Name "), "productname");
        assert_eq!(normalize_header("Unit-Cost ($)"), "unitcost");
        assert_eq!(normalize_header("---"), "");
    }

    #[test]
    fn test_propose_missing_price_is_incomplete() {
        let schema = products();
        let mappings = propose(&headers(&["sku", "product_name", "unit_cost"]), &schema);

        assert_eq!(mappings[0].mapped_field_key.as_deref(), Some("code"));
        assert_eq!(mappings[1].mapped_field_key.as_deref(), Some("name"));
        assert_eq!(mappings[2].mapped_field_key.as_deref(), Some("cost"));

        let v = validate(&mappings, &schema);
        assert!(!v.is_valid);
        assert_eq!((v.required_mapped, v.required_total), (2, 3));
        assert_eq!(v.missing_required, vec!["price".to_string()]);
    }

    #[test]
    fn test_propose_verbose_header_matches_alias() {
        let registry = SchemaRegistry::builtin().unwrap();
        let schema = registry.get(ImportDomain::DeliveryGuides).unwrap();
        let mappings = propose(&headers(&["fecha_registro"]), schema);
        assert_eq!(mappings[0].mapped_field_key.as_deref(), Some("date"));
    }

    #[test]
    fn test_propose_longest_term_wins() {
        let schema = products();
        // "codigo_padre" 同时包含 "codigo"(code 别名) 与 "codigopadre"(parent_code 别名)
        let mappings = propose(&headers(&["codigo_padre"]), &schema);
        assert_eq!(mappings[0].mapped_field_key.as_deref(), Some("parent_code"));
    }

    #[test]
    fn test_propose_exact_term_beats_longer_container() {
        let schema = products();
        // "code" 也被 "parentcode" 包含，但与 code 字段完全相等
        let mappings = propose(&headers(&["code"]), &schema);
        assert_eq!(mappings[0].mapped_field_key.as_deref(), Some("code"));
    }

    #[test]
    fn test_propose_extra_and_exclusive() {
        let schema = products();
        let mappings = propose(&headers(&["code", "sku", "zzz", "###"]), &schema);

        assert_eq!(mappings[0].status, MappingStatus::Match);
        assert_eq!(mappings[1].status, MappingStatus::Unmapped);
        assert_eq!(mappings[2].status, MappingStatus::Extra);
        assert_eq!(mappings[3].status, MappingStatus::Extra);
    }

    #[test]
    fn test_propose_is_deterministic() {
        let schema = products();
        let hs = headers(&["Precio", "Nombre", "SKU", "Stock", "costo unitario"]);
        assert_eq!(propose(&hs, &schema), propose(&hs, &schema));
    }

    #[test]
    fn test_remap_moves_field_and_clears_previous_holder() {
        let schema = products();
        let mut mappings = propose(&headers(&["sku", "name", "importe"]), &schema);
        assert_eq!(mappings[2].status, MappingStatus::Extra);

        remap(&mut mappings, &schema, "importe", Some("price")).unwrap();
        assert!(validate(&mappings, &schema).is_valid);

        remap(&mut mappings, &schema, "importe", Some("code")).unwrap();
        assert_eq!(mappings[0].status, MappingStatus::Unmapped);
        assert_eq!(mappings[0].mapped_field_key, None);
        assert_eq!(mappings[2].mapped_field_key.as_deref(), Some("code"));

        remap(&mut mappings, &schema, "importe", None).unwrap();
        assert_eq!(mappings[2].status, MappingStatus::Unmapped);
    }

    #[test]
    fn test_remap_rejects_unknown_header_and_field() {
        let schema = products();
        let mut mappings = propose(&headers(&["sku"]), &schema);
        assert_eq!(
            remap(&mut mappings, &schema, "nope", Some("code")),
            Err(MappingError::UnknownHeader("nope".to_string()))
        );
        assert!(matches!(
            remap(&mut mappings, &schema, "sku", Some("nope")),
            Err(MappingError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_build_raw_columns_samples_non_blank() {
        let hs = headers(&["sku", "price"]);
        let rows: Vec<RawRow> = vec![
            [("sku".to_string(), CellValue::from("A")), ("price".to_string(), CellValue::from(1.5))]
                .into_iter()
                .collect(),
            [("sku".to_string(), CellValue::Empty)].into_iter().collect(),
            [("sku".to_string(), CellValue::from("C"))].into_iter().collect(),
        ];

        let columns = build_raw_columns(&hs, &rows, 2);
        assert_eq!(columns[0].sample_values, vec!["A".to_string()]);
        assert_eq!(columns[1].sample_values, vec!["1.5".to_string()]);
    }
}
