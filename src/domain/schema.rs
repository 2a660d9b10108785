// ==========================================
// 批量导入与回滚账本 - 导入域 Schema 注册表
// ==========================================
// 职责: 声明各导入域的标准字段清单（必填/可选/类型/别名）
// 红线: 运行期不可变，进程启动时由静态配置构建
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ==========================================
// ImportDomain - 导入域
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportDomain {
    Products,       // 商品目录
    DeliveryGuides, // 送货单
    CostEntries,    // 成本台账
    ExpenseEntries, // 费用台账
    CapitalEntries, // 资本台账
}

impl ImportDomain {
    pub const ALL: [ImportDomain; 5] = [
        ImportDomain::Products,
        ImportDomain::DeliveryGuides,
        ImportDomain::CostEntries,
        ImportDomain::ExpenseEntries,
        ImportDomain::CapitalEntries,
    ];

    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportDomain::Products => "products",
            ImportDomain::DeliveryGuides => "delivery-guides",
            ImportDomain::CostEntries => "cost-entries",
            ImportDomain::ExpenseEntries => "expense-entries",
            ImportDomain::CapitalEntries => "capital-entries",
        }
    }
}

impl fmt::Display for ImportDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportDomain {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImportDomain::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s.trim())
            .ok_or_else(|| SchemaError::UnknownDomain(s.to_string()))
    }
}

// ==========================================
// FieldKind - 字段类型（决定类型转换规则）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Decimal,
    Integer,
    Date,
}

// ==========================================
// FieldSpec - 标准字段定义
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,                // 标准字段键（域内唯一）
    pub label: String,              // 展示名
    pub required: bool,             // 是否必填
    pub kind: FieldKind,            // 字段类型
    pub aliases: Vec<String>,       // 表头别名（参与自动映射）
    pub min: Option<f64>,           // 数值下限（业务规则，包含）
    pub references: Option<ImportDomain>, // 引用其他域实体的自然键
}

impl FieldSpec {
    pub fn new(key: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            required: false,
            kind,
            aliases: Vec::new(),
            min: None,
            references: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn references(mut self, domain: ImportDomain) -> Self {
        self.references = Some(domain);
        self
    }

    /// 参与匹配的词项：key 在前，别名在后
    pub fn match_terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.key.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

// ==========================================
// DomainSchema - 单个导入域的有序字段集
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSchema {
    pub domain: ImportDomain,
    pub entity_type: String,
    pub natural_key: String,
    pub fields: Vec<FieldSpec>,
}

impl DomainSchema {
    /// 构建并校验 schema（字段键唯一、自然键存在且必填）
    pub fn new(
        domain: ImportDomain,
        entity_type: &str,
        natural_key: &str,
        fields: Vec<FieldSpec>,
    ) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.key.as_str()) {
                return Err(SchemaError::DuplicateFieldKey {
                    domain: domain.as_str().to_string(),
                    key: field.key.clone(),
                });
            }
        }

        match fields.iter().find(|f| f.key == natural_key) {
            Some(f) if f.required => {}
            _ => {
                return Err(SchemaError::InvalidNaturalKey {
                    domain: domain.as_str().to_string(),
                    key: natural_key.to_string(),
                })
            }
        }

        Ok(Self {
            domain,
            entity_type: entity_type.to_string(),
            natural_key: natural_key.to_string(),
            fields,
        })
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn reference_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.references.is_some())
    }
}

// ==========================================
// SchemaRegistry - Schema 注册表
// ==========================================
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<DomainSchema>,
}

impl SchemaRegistry {
    /// 由 schema 列表构建注册表，校验域唯一与引用目标存在
    pub fn new(schemas: Vec<DomainSchema>) -> Result<Self, SchemaError> {
        let mut domains = HashSet::new();
        for schema in &schemas {
            if !domains.insert(schema.domain) {
                return Err(SchemaError::DuplicateDomain(schema.domain.as_str().to_string()));
            }
        }

        for schema in &schemas {
            for field in schema.reference_fields() {
                if let Some(target) = field.references {
                    if !domains.contains(&target) {
                        return Err(SchemaError::DanglingReference {
                            domain: schema.domain.as_str().to_string(),
                            key: field.key.clone(),
                            target: target.as_str().to_string(),
                        });
                    }
                }
            }
        }

        Ok(Self { schemas })
    }

    /// 内置静态配置
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::new(vec![
            products_schema()?,
            delivery_guides_schema()?,
            ledger_schema(ImportDomain::CostEntries, "cost_entry")?,
            ledger_schema(ImportDomain::ExpenseEntries, "expense_entry")?,
            ledger_schema(ImportDomain::CapitalEntries, "capital_entry")?,
        ])
    }

    pub fn get(&self, domain: ImportDomain) -> Result<&DomainSchema, SchemaError> {
        self.schemas
            .iter()
            .find(|s| s.domain == domain)
            .ok_or_else(|| SchemaError::UnknownDomain(domain.as_str().to_string()))
    }

    pub fn by_entity_type(&self, entity_type: &str) -> Result<&DomainSchema, SchemaError> {
        self.schemas
            .iter()
            .find(|s| s.entity_type == entity_type)
            .ok_or_else(|| SchemaError::UnknownEntityType(entity_type.to_string()))
    }

    pub fn schemas(&self) -> &[DomainSchema] {
        &self.schemas
    }
}

fn products_schema() -> Result<DomainSchema, SchemaError> {
    DomainSchema::new(
        ImportDomain::Products,
        "product",
        "code",
        vec![
            FieldSpec::new("code", "商品编码", FieldKind::Text)
                .required()
                .aliases(&["sku", "codigo"]),
            FieldSpec::new("name", "商品名称", FieldKind::Text)
                .required()
                .aliases(&["nombre", "descripcion"]),
            FieldSpec::new("price", "售价", FieldKind::Decimal)
                .required()
                .min(0.0)
                .aliases(&["precio"]),
            FieldSpec::new("cost", "成本价", FieldKind::Decimal)
                .min(0.0)
                .aliases(&["costo"]),
            FieldSpec::new("stock", "库存数量", FieldKind::Integer)
                .min(0.0)
                .aliases(&["existencia", "inventario"]),
            FieldSpec::new("category", "分类", FieldKind::Text).aliases(&["categoria"]),
            FieldSpec::new("unit", "计量单位", FieldKind::Text).aliases(&["unidad"]),
            FieldSpec::new("parent_code", "上级商品编码", FieldKind::Text)
                .aliases(&["codigo_padre"])
                .references(ImportDomain::Products),
        ],
    )
}

fn delivery_guides_schema() -> Result<DomainSchema, SchemaError> {
    DomainSchema::new(
        ImportDomain::DeliveryGuides,
        "delivery_guide",
        "guide_number",
        vec![
            FieldSpec::new("guide_number", "送货单号", FieldKind::Text)
                .required()
                .aliases(&["guia", "numero_guia"]),
            FieldSpec::new("date", "送货日期", FieldKind::Date)
                .required()
                .aliases(&["fecha"]),
            FieldSpec::new("product_code", "商品编码", FieldKind::Text)
                .required()
                .aliases(&["codigo_producto"])
                .references(ImportDomain::Products),
            FieldSpec::new("quantity", "数量", FieldKind::Decimal)
                .required()
                .min(0.0)
                .aliases(&["cantidad", "qty"]),
            FieldSpec::new("destination", "目的地", FieldKind::Text).aliases(&["destino"]),
            FieldSpec::new("carrier", "承运人", FieldKind::Text).aliases(&["transportista"]),
            FieldSpec::new("notes", "备注", FieldKind::Text).aliases(&["observaciones"]),
        ],
    )
}

fn ledger_schema(domain: ImportDomain, entity_type: &str) -> Result<DomainSchema, SchemaError> {
    DomainSchema::new(
        domain,
        entity_type,
        "document",
        vec![
            FieldSpec::new("document", "凭证号", FieldKind::Text)
                .required()
                .aliases(&["folio", "comprobante"]),
            FieldSpec::new("date", "记账日期", FieldKind::Date)
                .required()
                .aliases(&["fecha"]),
            FieldSpec::new("concept", "摘要", FieldKind::Text)
                .required()
                .aliases(&["concepto"]),
            FieldSpec::new("amount", "金额", FieldKind::Decimal)
                .required()
                .min(0.0)
                .aliases(&["monto", "importe"]),
            FieldSpec::new("category", "科目", FieldKind::Text).aliases(&["categoria"]),
            FieldSpec::new("counterparty", "往来单位", FieldKind::Text)
                .aliases(&["proveedor", "supplier"]),
        ],
    )
}

// ==========================================
// SchemaError - Schema 配置错误
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("未知导入域: {0}")]
    UnknownDomain(String),

    #[error("未知实体类型: {0}")]
    UnknownEntityType(String),

    #[error("导入域重复注册: {0}")]
    DuplicateDomain(String),

    #[error("字段键重复 (domain={domain}): {key}")]
    DuplicateFieldKey { domain: String, key: String },

    #[error("自然键无效 (domain={domain}): {key} 必须是已声明的必填字段")]
    InvalidNaturalKey { domain: String, key: String },

    #[error("引用目标未注册 (domain={domain}, field={key}): {target}")]
    DanglingReference {
        domain: String,
        key: String,
        target: String,
    },
}
