// ==========================================
// 批量导入与回滚账本 - 命令执行
// ==========================================
// 职责: 把 CLI 子命令转换为 API 调用，结果以 JSON 输出到 stdout
// ==========================================

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::api::ImportApi;
use crate::app::cli::{AuditArgs, Cli, Command, ImportArgs, PageArgs, ProposeArgs, RollbackArgs};
use crate::app::csv_source::{read_csv, DecodedFile};
use crate::app::state::AppState;
use crate::config::get_default_db_path;
use crate::domain::audit::AuditFilter;
use crate::domain::types::PageRequest;
use crate::importer::ImportRequest;
use crate::mapping::{build_raw_columns, ImportWizard, DEFAULT_SAMPLE_SIZE};

/// 执行一条子命令
pub async fn run(cli: Cli) -> Result<()> {
    let db_path = cli
        .db_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(get_default_db_path);
    let state = AppState::new(db_path).context("初始化应用状态失败")?;
    let api = state.import_api.as_ref();

    match cli.command {
        Command::Init => print_json(&json!({
            "db_path": &state.db_path,
            "schema_version": crate::db::CURRENT_SCHEMA_VERSION,
        })),
        Command::Schemas => print_json(&api.schemas()),
        Command::Propose(args) => run_propose(api, &args),
        Command::Import(args) => run_import(api, &args).await,
        Command::Rollback(args) => run_rollback(api, &args).await,
        Command::Batches(page) => print_json(&api.list_batches(page_request(&page)).await?),
        Command::Batch { batch_id } => print_json(&api.batch_detail(&batch_id)?),
        Command::Audit(args) => run_audit(api, &args).await,
        Command::Config { key, value } => run_config(api, key, value),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn page_request(page: &PageArgs) -> PageRequest {
    PageRequest::new(page.limit, page.offset)
}

fn run_propose(api: &ImportApi, args: &ProposeArgs) -> Result<()> {
    let decoded = read_csv(&args.file)?;
    let mappings = api.propose_mapping(args.domain, &decoded.headers)?;
    let validation = api.validate_mapping(args.domain, &mappings)?;
    print_json(&json!({
        "file_name": decoded.file_name,
        "columns": build_raw_columns(&decoded.headers, &decoded.rows, DEFAULT_SAMPLE_SIZE),
        "mappings": mappings,
        "validation": validation,
    }))
}

/// 按向导流程准备一个文件: Upload → Preview → Mapping（应用人工映射）
fn prepare_request(api: &ImportApi, args: &ImportArgs, path: &Path) -> Result<ImportRequest> {
    let DecodedFile {
        file_name,
        headers,
        rows,
    } = read_csv(path)?;

    let mut wizard = ImportWizard::new(args.domain);
    wizard.load_file(
        &file_name,
        build_raw_columns(&headers, &rows, DEFAULT_SAMPLE_SIZE),
        rows.len(),
    )?;
    wizard.begin_mapping(api.schema(args.domain)?)?;

    let session = wizard
        .session_mut()
        .ok_or_else(|| anyhow!("向导未进入映射阶段"))?;
    for header in &args.unmap {
        session.remap(header, None)?;
    }
    for (header, field) in &args.map {
        session.remap(header, Some(field.as_str()))?;
    }

    let validation = session.validate();
    if !validation.is_valid {
        bail!(
            "{}: 必填字段已映射 {}/{}，缺少 {:?}",
            file_name,
            validation.required_mapped,
            validation.required_total,
            validation.missing_required
        );
    }

    Ok(ImportRequest {
        domain: session.domain(),
        file_name,
        rows,
        mappings: session.mappings().to_vec(),
        actor_id: args.actor_id.clone(),
    })
}

async fn run_import(api: &ImportApi, args: &ImportArgs) -> Result<()> {
    let mut requests = Vec::with_capacity(args.files.len());
    for path in &args.files {
        requests.push(prepare_request(api, args, path)?);
    }
    info!(files = requests.len(), domain = %args.domain, "开始导入");

    let file_names: Vec<String> = requests.iter().map(|r| r.file_name.clone()).collect();
    let results = api.execute_many(requests).await;

    let mut failures = 0;
    let report: Vec<_> = file_names
        .iter()
        .zip(results)
        .map(|(file_name, result)| match result {
            Ok(batch) => json!({ "file_name": file_name, "batch": batch }),
            Err(e) => {
                failures += 1;
                warn!(file = %file_name, error = %e, "导入被拒绝");
                json!({ "file_name": file_name, "error": e.to_string() })
            }
        })
        .collect();
    print_json(&report)?;

    if failures > 0 {
        bail!("{} 个文件导入被拒绝", failures);
    }
    Ok(())
}

async fn run_rollback(api: &ImportApi, args: &RollbackArgs) -> Result<()> {
    if args.preview {
        return print_json(&api.preview_rollback(&args.batch_id).await?);
    }
    let actor_id = args
        .actor_id
        .as_deref()
        .ok_or_else(|| anyhow!("回滚需要 --actor"))?;

    match api.rollback(&args.batch_id, actor_id).await {
        Ok(result) => print_json(&result),
        Err(crate::api::ApiError::RollbackUnsafe { batch_id, blockers }) => {
            print_json(&json!({ "batch_id": &batch_id, "blockers": blockers }))?;
            bail!("回滚不安全，批次 {} 保持 completed", batch_id)
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_audit(api: &ImportApi, args: &AuditArgs) -> Result<()> {
    let filter = AuditFilter {
        actor_id: args.actor_id.clone(),
        entity_type: args.entity_type.clone(),
        entity_id: args.entity_id.clone(),
    };
    print_json(&api.list_audit(&filter, page_request(&args.page)).await?)
}

fn run_config(api: &ImportApi, key: Option<String>, value: Option<String>) -> Result<()> {
    let config = api.config();
    match (key, value) {
        (None, _) => {
            let snapshot = config.get_config_snapshot().map_err(|e| anyhow!(e))?;
            println!("{}", snapshot);
            Ok(())
        }
        (Some(key), None) => {
            let value = config.get_global_config_value(&key).map_err(|e| anyhow!(e))?;
            print_json(&json!({ "key": key, "value": value }))
        }
        (Some(key), Some(value)) => {
            config.set_config_value(&key, &value).map_err(|e| anyhow!(e))?;
            info!(config_key = %key, "配置已更新");
            print_json(&json!({ "key": key, "value": value }))
        }
    }
}
