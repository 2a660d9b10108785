// ==========================================
// 批量导入与回滚账本 - 批次导入 Trait
// ==========================================
// 职责: 定义导入执行接口（不包含实现）
// ==========================================

use crate::domain::import::{ImportBatch, RawRow};
use crate::domain::mapping::ColumnMapping;
use crate::domain::schema::ImportDomain;
use crate::importer::error::ImportResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ==========================================
// ImportRequest - 单个文件的导入请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub domain: ImportDomain,
    pub file_name: String,
    pub rows: Vec<RawRow>,              // 解码协作方交付的行（文件顺序）
    pub mappings: Vec<ColumnMapping>,   // 操作员确认后的映射
    pub actor_id: String,               // 身份协作方提供
}

// ==========================================
// BatchImporter Trait
// ==========================================
// 实现者: BatchImporterImpl
#[async_trait]
pub trait BatchImporter: Send + Sync {
    /// 执行一个导入批次
    ///
    /// # 返回
    /// - Ok(ImportBatch): completed（至少一行成功）或 failed
    /// - Err(MappingIncomplete / TooManyRows / ...): 前置条件不满足，不创建批次
    ///
    /// # 执行流程
    /// 1. 校验映射完整性与行数上限
    /// 2. 创建 pending 批次
    /// 3. 按文件顺序逐行：投影 → 类型转换 → 业务校验 → 单行事务落库
    /// 4. 结束批次 + 写审计
    async fn execute(&self, request: ImportRequest) -> ImportResult<ImportBatch>;

    /// 并发执行多个独立批次（批次内仍严格顺序）
    ///
    /// 某个批次失败不影响其他批次
    async fn execute_many(&self, requests: Vec<ImportRequest>) -> Vec<ImportResult<ImportBatch>>;
}
