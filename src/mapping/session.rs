// ==========================================
// 批量导入与回滚账本 - 映射会话与导入向导
// ==========================================
// 职责: 在 上传 → 预览 → 映射 → 执行 各阶段之间传递映射状态
// 红线: 会话由调用方持有，核心不保存任何全局状态
// ==========================================

use crate::domain::import::ImportBatch;
use crate::domain::mapping::{ColumnMapping, MappingValidation, RawColumn};
use crate::domain::schema::{DomainSchema, ImportDomain};
use crate::mapping::column_mapper::{propose, remap, validate};
use crate::mapping::error::{MappingError, MappingResult};
use std::collections::HashSet;

// ==========================================
// MappingSession - 单个文件的映射会话
// ==========================================
#[derive(Debug, Clone)]
pub struct MappingSession {
    schema: DomainSchema,
    headers: Vec<String>,
    mappings: Vec<ColumnMapping>,
    // 人工改映射（按操作顺序，同一表头只保留最后一次）
    overrides: Vec<(String, Option<String>)>,
}

impl MappingSession {
    /// 以建议映射开启会话
    pub fn new(schema: &DomainSchema, headers: Vec<String>) -> MappingResult<Self> {
        ensure_unique(&headers)?;
        let mappings = propose(&headers, schema);
        Ok(Self {
            schema: schema.clone(),
            headers,
            mappings,
            overrides: Vec::new(),
        })
    }

    pub fn domain(&self) -> ImportDomain {
        self.schema.domain
    }

    pub fn schema(&self) -> &DomainSchema {
        &self.schema
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    /// 人工改映射，返回改后的校验结果
    pub fn remap(&mut self, raw_header: &str, field_key: Option<&str>) -> MappingResult<MappingValidation> {
        remap(&mut self.mappings, &self.schema, raw_header, field_key)?;

        self.overrides.retain(|(header, _)| header != raw_header);
        self.overrides
            .push((raw_header.to_string(), field_key.map(str::to_string)));

        Ok(self.validate())
    }

    pub fn validate(&self) -> MappingValidation {
        validate(&self.mappings, &self.schema)
    }

    /// 重新获取表头
    ///
    /// # 返回
    /// - Ok(false): 表头未变，保留当前映射（含人工改映射）
    /// - Ok(true): 表头已变，重新建议并对仍存在的表头重放人工改映射
    pub fn refresh_headers(&mut self, headers: Vec<String>) -> MappingResult<bool> {
        if headers == self.headers {
            return Ok(false);
        }
        ensure_unique(&headers)?;

        let mut mappings = propose(&headers, &self.schema);
        self.overrides.retain(|(header, _)| headers.contains(header));
        for (header, key) in &self.overrides {
            remap(&mut mappings, &self.schema, header, key.as_deref())?;
        }

        self.headers = headers;
        self.mappings = mappings;
        Ok(true)
    }
}

fn ensure_unique(headers: &[String]) -> MappingResult<()> {
    let mut seen = HashSet::new();
    for header in headers {
        if !seen.insert(header.as_str()) {
            return Err(MappingError::DuplicateHeader(header.clone()));
        }
    }
    Ok(())
}

// ==========================================
// ImportWizard - 调用方持有的导入向导状态
// ==========================================
// Upload → Preview → Mapping → Executed，任何阶段可 reset 回 Upload
#[derive(Debug, Clone)]
pub enum ImportWizard {
    Upload {
        domain: ImportDomain,
    },
    Preview {
        domain: ImportDomain,
        file_name: String,
        columns: Vec<RawColumn>,
        row_count: usize,
    },
    Mapping {
        file_name: String,
        session: MappingSession,
        row_count: usize,
    },
    Executed {
        batch: ImportBatch,
    },
}

impl ImportWizard {
    pub fn new(domain: ImportDomain) -> Self {
        ImportWizard::Upload { domain }
    }

    pub fn step_name(&self) -> &'static str {
        match self {
            ImportWizard::Upload { .. } => "upload",
            ImportWizard::Preview { .. } => "preview",
            ImportWizard::Mapping { .. } => "mapping",
            ImportWizard::Executed { .. } => "executed",
        }
    }

    /// Upload → Preview
    pub fn load_file(&mut self, file_name: &str, columns: Vec<RawColumn>, row_count: usize) -> MappingResult<()> {
        match self {
            ImportWizard::Upload { domain } => {
                let domain = *domain;
                *self = ImportWizard::Preview {
                    domain,
                    file_name: file_name.to_string(),
                    columns,
                    row_count,
                };
                Ok(())
            }
            other => Err(MappingError::IllegalTransition {
                from: other.step_name(),
                action: "load_file",
            }),
        }
    }

    /// Preview → Mapping（生成建议映射）
    pub fn begin_mapping(&mut self, schema: &DomainSchema) -> MappingResult<()> {
        match self {
            ImportWizard::Preview {
                domain,
                file_name,
                columns,
                row_count,
            } => {
                if *domain != schema.domain {
                    return Err(MappingError::DomainMismatch {
                        expected: domain.as_str().to_string(),
                        actual: schema.domain.as_str().to_string(),
                    });
                }
                let headers = columns.iter().map(|c| c.header_text.clone()).collect();
                let session = MappingSession::new(schema, headers)?;
                let file_name = std::mem::take(file_name);
                let row_count = *row_count;
                *self = ImportWizard::Mapping {
                    file_name,
                    session,
                    row_count,
                };
                Ok(())
            }
            other => Err(MappingError::IllegalTransition {
                from: other.step_name(),
                action: "begin_mapping",
            }),
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut MappingSession> {
        match self {
            ImportWizard::Mapping { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&MappingSession> {
        match self {
            ImportWizard::Mapping { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Mapping → Executed
    pub fn mark_executed(&mut self, batch: ImportBatch) -> MappingResult<()> {
        match self {
            ImportWizard::Mapping { .. } => {
                *self = ImportWizard::Executed { batch };
                Ok(())
            }
            other => Err(MappingError::IllegalTransition {
                from: other.step_name(),
                action: "mark_executed",
            }),
        }
    }

    /// 任意阶段回到 Upload
    pub fn reset(&mut self, domain: ImportDomain) {
        *self = ImportWizard::Upload { domain };
    }
}
