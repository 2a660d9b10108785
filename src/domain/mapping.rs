// ==========================================
// 批量导入与回滚账本 - 列映射领域模型
// ==========================================
// 用途: 原始表头 → 标准字段 的映射结果
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// RawColumn - 上传文件中识别出的一列
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub header_text: String,
    pub sample_values: Vec<String>,
}

// ==========================================
// MappingStatus - 映射状态
// ==========================================
// match:    已映射到标准字段
// unmapped: 存在候选字段但当前未映射（人工清除或候选已被占用）
// extra:    没有任何候选字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Match,
    Unmapped,
    Extra,
}

// ==========================================
// ColumnMapping - 单列映射
// ==========================================
// 红线: 同一字段键同一时刻最多被一个 ColumnMapping 持有
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub raw_header: String,
    pub mapped_field_key: Option<String>,
    pub status: MappingStatus,
}

impl ColumnMapping {
    pub fn matched(raw_header: &str, field_key: &str) -> Self {
        Self {
            raw_header: raw_header.to_string(),
            mapped_field_key: Some(field_key.to_string()),
            status: MappingStatus::Match,
        }
    }

    pub fn unmapped(raw_header: &str) -> Self {
        Self {
            raw_header: raw_header.to_string(),
            mapped_field_key: None,
            status: MappingStatus::Unmapped,
        }
    }

    pub fn extra(raw_header: &str) -> Self {
        Self {
            raw_header: raw_header.to_string(),
            mapped_field_key: None,
            status: MappingStatus::Extra,
        }
    }

    pub fn is_match(&self) -> bool {
        self.status == MappingStatus::Match && self.mapped_field_key.is_some()
    }
}

// ==========================================
// MappingValidation - 映射完整性校验结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingValidation {
    pub required_total: usize,
    pub required_mapped: usize,
    pub is_valid: bool,
    pub missing_required: Vec<String>, // 未映射的必填字段键
}
