// ==========================================
// 批量导入与回滚账本 - CSV 文件解码
// ==========================================
// 职责: 作为文件解码协作方，把 CSV 交付为 表头 + 原始行（保持列序与行序）
// 说明: 二进制表格格式不在本核心内解析
// ==========================================

use crate::domain::import::{CellValue, RawRow};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// 解码后的文件
#[derive(Debug, Clone)]
pub struct DecodedFile {
    pub file_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

#[derive(Error, Debug)]
pub enum CsvSourceError {
    #[error("文件未找到: {0}")]
    FileNotFound(String),

    #[error("不支持的文件格式: {0}（仅支持 .csv）")]
    UnsupportedFormat(String),

    #[error("表头重复: {0}")]
    DuplicateHeader(String),

    #[error("CSV 解析失败: {0}")]
    Csv(#[from] csv::Error),

    #[error("文件读取失败: {0}")]
    Io(#[from] std::io::Error),
}

/// 读取 CSV 文件
///
/// 空单元格为 Empty，其余保留为文本（类型转换由导入引擎按 schema 完成）；
/// 完全空白的行跳过
pub fn read_csv(path: &Path) -> Result<DecodedFile, CsvSourceError> {
    if !path.exists() {
        return Err(CsvSourceError::FileNotFound(path.display().to_string()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if ext != "csv" {
        return Err(CsvSourceError::UnsupportedFormat(ext));
    }

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // 允许行长度不一致
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let mut seen = HashSet::new();
    for header in &headers {
        if !seen.insert(header.as_str()) {
            return Err(CsvSourceError::DuplicateHeader(header.clone()));
        }
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row = RawRow::new();
        for (idx, header) in headers.iter().enumerate() {
            let cell = match record.get(idx) {
                Some(value) if !value.trim().is_empty() => CellValue::Text(value.to_string()),
                _ => CellValue::Empty,
            };
            row.insert(header.clone(), cell);
        }

        if row.values().all(CellValue::is_blank) {
            continue;
        }
        rows.push(row);
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(DecodedFile {
        file_name,
        headers,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_csv_keeps_order_and_skips_blank_rows() {
        let file = csv_file("SKU, Nombre ,Precio\nA-1,Apple,1.50\n,,\nA-2,,2\n");
        let decoded = read_csv(file.path()).unwrap();

        assert_eq!(decoded.headers, vec!["SKU", "Nombre", "Precio"]);
        assert_eq!(decoded.rows.len(), 2);
        assert_eq!(decoded.rows[0]["SKU"], CellValue::Text("A-1".to_string()));
        assert_eq!(decoded.rows[1]["Nombre"], CellValue::Empty);
    }

    #[test]
    fn test_read_csv_rejects_duplicate_headers() {
        let file = csv_file("code,code\n1,2\n");
        assert!(matches!(read_csv(file.path()), Err(CsvSourceError::DuplicateHeader(_))));
    }

    #[test]
    fn test_read_csv_rejects_other_formats() {
        assert!(matches!(
            read_csv(Path::new("missing.csv")),
            Err(CsvSourceError::FileNotFound(_))
        ));
        let file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        assert!(matches!(
            read_csv(file.path()),
            Err(CsvSourceError::UnsupportedFormat(_))
        ));
    }
}
