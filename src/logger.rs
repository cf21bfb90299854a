use tracing_subscriber::{EnvFilter, fmt};

/// 初始化日志系统
///
/// 日志写到 stderr，stdout 留给导出的文档和结果表格。
/// 支持通过 RUST_LOG 环境变量控制日志级别，否则使用 `default_level`
///
/// 示例:
/// - RUST_LOG=debug authmatrix run spec.json
/// - RUST_LOG=authmatrix::runner=trace authmatrix run spec.json
pub fn init_logger(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::debug!("Logger initialized");
}
