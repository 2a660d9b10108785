// ==========================================
// 批量导入与回滚账本 - 命令行参数
// ==========================================

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::schema::ImportDomain;

#[derive(Parser, Debug)]
#[command(
    name = "import-ledger",
    version,
    about = "批量导入与回滚账本 - 表格数据导入、审计与回滚"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// 数据库文件路径（默认: IMPORT_LEDGER_DB_PATH 或用户数据目录）
    #[arg(long = "db", value_name = "PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// 以 JSON 格式输出日志（stderr）
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 初始化数据库（幂等建表）
    Init,

    /// 列出全部导入域及其标准字段
    Schemas,

    /// 读取 CSV 表头并给出建议映射
    Propose(ProposeArgs),

    /// 执行导入（多个文件并发，各自成为独立批次）
    Import(ImportArgs),

    /// 回滚一个已完成的批次
    Rollback(RollbackArgs),

    /// 批次历史（最近优先）
    Batches(PageArgs),

    /// 批次详情（行结果 + 变更记录）
    Batch {
        /// 批次 ID
        batch_id: String,
    },

    /// 审计活动流（最近优先）
    Audit(AuditArgs),

    /// 读取或设置全局配置
    Config {
        /// 配置键（省略时输出全部配置）
        key: Option<String>,
        /// 新值（省略时只读取）
        value: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct ProposeArgs {
    /// 导入域（products / delivery-guides / cost-entries / expense-entries / capital-entries）
    #[arg(value_parser = parse_domain)]
    pub domain: ImportDomain,

    /// CSV 文件
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// 导入域
    #[arg(value_parser = parse_domain)]
    pub domain: ImportDomain,

    /// CSV 文件（可多个）
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// 操作人
    #[arg(long = "actor")]
    pub actor_id: String,

    /// 人工映射 表头=字段键（可重复）
    #[arg(long = "map", value_name = "HEADER=FIELD", value_parser = parse_assignment)]
    pub map: Vec<(String, String)>,

    /// 清除某表头的映射（可重复）
    #[arg(long = "unmap", value_name = "HEADER")]
    pub unmap: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// 批次 ID
    pub batch_id: String,

    /// 操作人
    #[arg(long = "actor", required_unless_present = "preview")]
    pub actor_id: Option<String>,

    /// 只做预检，不落库
    #[arg(long = "preview")]
    pub preview: bool,
}

#[derive(Args, Debug)]
pub struct PageArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// 按操作人过滤
    #[arg(long = "actor")]
    pub actor_id: Option<String>,

    /// 按实体类型过滤
    #[arg(long = "entity-type")]
    pub entity_type: Option<String>,

    /// 按实体 ID 过滤
    #[arg(long = "entity-id")]
    pub entity_id: Option<String>,

    #[command(flatten)]
    pub page: PageArgs,
}

fn parse_domain(value: &str) -> Result<ImportDomain, String> {
    value.parse::<ImportDomain>().map_err(|e| e.to_string())
}

fn parse_assignment(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((header, field)) if !header.trim().is_empty() && !field.trim().is_empty() => {
            Ok((header.trim().to_string(), field.trim().to_string()))
        }
        _ => Err(format!("格式应为 HEADER=FIELD: {}", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_command() {
        let cli = Cli::try_parse_from([
            "import-ledger",
            "--db",
            "/tmp/x.db",
            "import",
            "products",
            "a.csv",
            "b.csv",
            "--actor",
            "alice",
            "--map",
            "Precio Venta=price",
            "--unmap",
            "Notas",
        ])
        .unwrap();

        match cli.command {
            Command::Import(args) => {
                assert_eq!(args.domain, ImportDomain::Products);
                assert_eq!(args.files.len(), 2);
                assert_eq!(args.map, vec![("Precio Venta".to_string(), "price".to_string())]);
                assert_eq!(args.unmap, vec!["Notas".to_string()]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rollback_requires_actor_unless_preview() {
        assert!(Cli::try_parse_from(["import-ledger", "rollback", "b1"]).is_err());
        assert!(Cli::try_parse_from(["import-ledger", "rollback", "b1", "--preview"]).is_ok());
    }

    #[test]
    fn test_unknown_domain_rejected() {
        assert!(Cli::try_parse_from(["import-ledger", "propose", "widgets", "a.csv"]).is_err());
    }
}
