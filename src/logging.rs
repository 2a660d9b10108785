// ==========================================
// 批量导入与回滚账本 - 日志初始化
// ==========================================
// 输出: stderr（stdout 只给命令结果）
// 格式: 文本 / JSON（--log-json）
// 过滤: RUST_LOG 优先，缺省为 DEFAULT_DIRECTIVES
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 缺省过滤规则：本库 info，其余依赖只报 warn
pub const DEFAULT_DIRECTIVES: &str = "warn,import_ledger=info";

/// 构造过滤器
///
/// # 参数
/// - `verbose`: true 时把本库提升到 debug
fn build_filter(verbose: bool) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("warn,import_ledger=debug"),
        Err(_) => EnvFilter::new(DEFAULT_DIRECTIVES),
    }
}

/// 初始化进程级日志订阅者（每个进程调用一次）
///
/// # 示例
/// ```no_run
/// import_ledger::logging::init(false);
/// // RUST_LOG=import_ledger::ledger=trace 可单独打开回滚细节
/// ```
pub fn init(json: bool) {
    let filter = build_filter(false);
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);

    if json {
        builder.json().with_current_span(true).init();
    } else {
        builder.with_target(true).with_line_number(true).init();
    }
}

/// 测试用订阅者：输出交给 libtest 捕获，重复调用无副作用
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(build_filter(true))
        .with_test_writer()
        .try_init();
}
