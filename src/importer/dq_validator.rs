// ==========================================
// 批量导入与回滚账本 - 行数据质量校验器
// ==========================================
// 职责: 必填非空 + 数值下限等域业务规则
// 说明: 引用解析依赖存储当前状态，在行事务内完成（见 batch_importer_impl）
// ==========================================

use crate::domain::import::{CanonicalRecord, FieldValue};
use crate::domain::schema::DomainSchema;
use crate::importer::error::RowError;

pub struct DqValidator<'a> {
    schema: &'a DomainSchema,
}

impl<'a> DqValidator<'a> {
    pub fn new(schema: &'a DomainSchema) -> Self {
        Self { schema }
    }

    /// 校验一条标准记录，返回全部违规项（空表示通过）
    pub fn validate(&self, record: &CanonicalRecord) -> Vec<RowError> {
        let mut violations = Vec::new();

        for field in &self.schema.fields {
            let value = record.get(&field.key).unwrap_or(&FieldValue::Absent);

            if field.required && *value == FieldValue::Absent {
                violations.push(RowError::MissingRequired {
                    field: field.key.clone(),
                });
                continue;
            }

            if let Some(min) = field.min {
                let numeric = match value {
                    FieldValue::Decimal(d) => Some(*d),
                    FieldValue::Integer(i) => Some(*i as f64),
                    _ => None,
                };
                if let Some(v) = numeric.filter(|v| *v < min) {
                    violations.push(RowError::BelowMinimum {
                        field: field.key.clone(),
                        value: v,
                        min,
                    });
                }
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{ImportDomain, SchemaRegistry};

    fn record(pairs: &[(&str, FieldValue)]) -> CanonicalRecord {
        let mut r = CanonicalRecord::default();
        for (k, v) in pairs {
            r.fields.insert(k.to_string(), v.clone());
        }
        r
    }

    #[test]
    fn test_required_and_min() {
        let registry = SchemaRegistry::builtin().unwrap();
        let validator = DqValidator::new(registry.get(ImportDomain::Products).unwrap());

        let ok = record(&[
            ("code", FieldValue::Text("A".to_string())),
            ("name", FieldValue::Text("Apple".to_string())),
            ("price", FieldValue::Decimal(0.0)),
            ("stock", FieldValue::Absent),
        ]);
        assert!(validator.validate(&ok).is_empty());

        let bad = record(&[
            ("code", FieldValue::Text("A".to_string())),
            ("name", FieldValue::Absent),
            ("price", FieldValue::Decimal(1.0)),
            ("stock", FieldValue::Integer(-3)),
        ]);
        let violations = validator.validate(&bad);
        assert_eq!(
            violations,
            vec![
                RowError::MissingRequired { field: "name".to_string() },
                RowError::BelowMinimum {
                    field: "stock".to_string(),
                    value: -3.0,
                    min: 0.0
                },
            ]
        );
    }

    #[test]
    fn test_negative_quantity_rejected() {
        let registry = SchemaRegistry::builtin().unwrap();
        let validator = DqValidator::new(registry.get(ImportDomain::DeliveryGuides).unwrap());
        let r = record(&[
            ("guide_number", FieldValue::Text("G-1".to_string())),
            ("date", FieldValue::Text("2025-01-01".to_string())),
            ("product_code", FieldValue::Text("A".to_string())),
            ("quantity", FieldValue::Decimal(-1.0)),
        ]);
        assert!(matches!(
            validator.validate(&r).as_slice(),
            [RowError::BelowMinimum { .. }]
        ));
    }
}
