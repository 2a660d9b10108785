// ==========================================
// 批量导入与回滚账本 - 字段映射器实现
// ==========================================
// 职责: 原始行 → 标准记录（按列映射投影 + 类型转换）
// 红线: 非数值输入为行级拒绝，绝不静默转为 0
// ==========================================

use crate::domain::import::{CanonicalRecord, CellValue, FieldValue, RawRow};
use crate::domain::mapping::ColumnMapping;
use crate::domain::schema::{DomainSchema, FieldKind, FieldSpec};
use crate::importer::error::RowError;
use chrono::{Days, NaiveDate};

/// 接受的日期文本格式（按尝试顺序）
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%Y%m%d"];

/// 表格序列日期的上限（9999-12-31）
const MAX_SERIAL_DATE: f64 = 2_958_465.0;

// ==========================================
// FieldMapper - 行投影器
// ==========================================
pub struct FieldMapper<'a> {
    schema: &'a DomainSchema,
    // (原始表头, 字段定义)，仅 match 状态的列
    columns: Vec<(&'a str, &'a FieldSpec)>,
}

impl<'a> FieldMapper<'a> {
    /// 由已确认的列映射构建投影器（未知字段键的列忽略）
    pub fn new(schema: &'a DomainSchema, mappings: &'a [ColumnMapping]) -> Self {
        let columns = mappings
            .iter()
            .filter(|m| m.is_match())
            .filter_map(|m| {
                let key = m.mapped_field_key.as_deref()?;
                schema.field(key).map(|spec| (m.raw_header.as_str(), spec))
            })
            .collect();
        Self { schema, columns }
    }

    /// 本次文件映射到的字段键
    pub fn mapped_keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(_, spec)| spec.key.as_str())
    }

    /// 投影并转换一行
    ///
    /// # 返回
    /// - Ok(CanonicalRecord): 每个 schema 字段都有值，未映射/空值为 Absent
    /// - Err(Vec<RowError>): 该行全部类型转换错误
    pub fn map_row(&self, row: &RawRow) -> Result<CanonicalRecord, Vec<RowError>> {
        let mut record = CanonicalRecord::default();
        for field in &self.schema.fields {
            record.fields.insert(field.key.clone(), FieldValue::Absent);
        }

        let mut errors = Vec::new();
        for (header, spec) in &self.columns {
            let cell = row.get(*header).unwrap_or(&CellValue::Empty);
            match coerce_cell(cell, spec) {
                Ok(value) => {
                    record.fields.insert(spec.key.clone(), value);
                }
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(record)
        } else {
            Err(errors)
        }
    }
}

/// 按字段类型转换单元格
pub fn coerce_cell(cell: &CellValue, spec: &FieldSpec) -> Result<FieldValue, RowError> {
    if cell.is_blank() {
        return Ok(FieldValue::Absent);
    }

    match spec.kind {
        FieldKind::Text => Ok(cell
            .as_text()
            .map(FieldValue::Text)
            .unwrap_or(FieldValue::Absent)),
        FieldKind::Decimal => parse_decimal(cell)
            .map(FieldValue::Decimal)
            .ok_or_else(|| RowError::InvalidDecimal {
                field: spec.key.clone(),
                value: display_cell(cell),
            }),
        FieldKind::Integer => parse_integer(cell)
            .map(FieldValue::Integer)
            .ok_or_else(|| RowError::InvalidInteger {
                field: spec.key.clone(),
                value: display_cell(cell),
            }),
        FieldKind::Date => parse_date(cell)
            .map(FieldValue::Date)
            .ok_or_else(|| RowError::InvalidDate {
                field: spec.key.clone(),
                value: display_cell(cell),
            }),
    }
}

fn display_cell(cell: &CellValue) -> String {
    cell.as_text().unwrap_or_default()
}

/// 小数（仅点号小数分隔符）
fn parse_decimal(cell: &CellValue) -> Option<f64> {
    let value = match cell {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.contains(',') {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        CellValue::Bool(_) | CellValue::Empty => return None,
    };
    value.is_finite().then_some(value)
}

/// 整数（允许 "10.0"，拒绝小数部分）
fn parse_integer(cell: &CellValue) -> Option<i64> {
    if let CellValue::Text(s) = cell {
        if let Ok(i) = s.trim().parse::<i64>() {
            return Some(i);
        }
    }
    let value = parse_decimal(cell)?;
    // i64::MAX as f64 即 2^63，已超出 i64 范围
    if value.fract() != 0.0 || value >= i64::MAX as f64 || value < i64::MIN as f64 {
        return None;
    }
    Some(value as i64)
}

/// 日期（文本格式或表格序列日期）
fn parse_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Number(n) => serial_to_date(*n),
        CellValue::Text(s) => {
            let trimmed = s.trim();
            // 带时间部分的 ISO 文本只取日期
            let date_part = match trimmed.char_indices().nth(10) {
                Some((idx, 'T')) | Some((idx, ' ')) => &trimmed[..idx],
                _ => trimmed,
            };

            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
                .or_else(|| {
                    // 文本形式的序列日期（CSV 导出的表格日期）
                    if date_part.len() <= 7 && date_part.chars().all(|c| c.is_ascii_digit() || c == '.') {
                        date_part.parse::<f64>().ok().and_then(serial_to_date)
                    } else {
                        None
                    }
                })
        }
        CellValue::Bool(_) | CellValue::Empty => None,
    }
}

/// 表格序列日期 → 日历日期（基准 1899-12-30）
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_SERIAL_DATE {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_days(Days::new(serial.trunc() as u64))
}
