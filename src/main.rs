// ==========================================
// 批量导入与回滚账本 - 命令行入口
// ==========================================

use clap::Parser;
use import_ledger::app::{run, Cli};
use import_ledger::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    tracing::info!("{} v{}", import_ledger::APP_NAME, import_ledger::VERSION);
    run(cli).await
}
