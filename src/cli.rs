use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use authmatrix::config::Config;
use authmatrix::convert::{self, RoleCollection, analyze_access, merge_multi, suggest_role_name};
use authmatrix::export::{ExportFormat, Exporter};
use authmatrix::runner::{ExecutionEngine, MatrixReporter, ResultMatrix, RunOutcome};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// 配置文件路径，默认查找 authmatrix.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 输出更多日志（RUST_LOG 优先）
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 对每个 endpoint x role 发送请求并检查期望
    Run {
        /// AuthMatrix 文档或 Postman 集合
        path: PathBuf,

        /// 覆盖文档中的 base_url
        #[arg(long)]
        base_url: Option<String>,
    },
    /// 在 AuthMatrix 和 Postman 之间转换
    Convert {
        path: PathBuf,

        #[arg(long, value_enum)]
        to: OutputFormat,

        /// 输出文件，默认 stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 合并多个角色的 Postman 集合，推断访问矩阵
    Merge {
        /// role=collection.json，省略 role 时根据集合名称推断
        #[arg(required = true)]
        inputs: Vec<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 只打印访问分组，不输出合并后的文档
        #[arg(long)]
        analyze: bool,
    },
    /// 为每个期望 2xx 的角色导出一个 Postman 集合
    Split {
        path: PathBuf,

        #[arg(long)]
        out_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Authmatrix,
    Postman,
}

impl From<OutputFormat> for ExportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Authmatrix => ExportFormat::AuthMatrix,
            OutputFormat::Postman => ExportFormat::Postman,
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn emit(document: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Exporter::write_to(&mut file, document)?;
            info!(path = %path.display(), "wrote document");
        }
        None => Exporter::write_to(&mut io::stdout().lock(), document)?,
    }
    Ok(())
}

/// 执行矩阵，全部通过返回 true
pub async fn run_matrix(path: &Path, base_url: Option<String>, config: &Config, verbose: bool) -> Result<bool> {
    let mut spec = convert::parse(&read_file(path)?)?;
    if let Some(base_url) = base_url {
        spec.base_url = base_url;
    }

    let reporter = MatrixReporter::new(verbose);
    reporter.print_header(&path.display().to_string(), &spec);

    let engine = ExecutionEngine::new(&config.engine)?;
    let mut handle = engine.start(&spec);

    let mut matrix = ResultMatrix::new();
    let mut ticker = tokio::time::interval(config.runner.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut listening = true;
    let mut deadline: Option<Instant> = None;

    let outcome = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(outcome) = handle.poll_with(&mut matrix, |endpoint, role, cell| {
                    reporter.print_cell(endpoint, role, cell)
                }) {
                    break Some(outcome);
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break None;
                }
            }
            signal = tokio::signal::ctrl_c(), if listening => {
                listening = false;
                match signal {
                    Ok(()) => {
                        warn!("interrupted, stopping after the current request");
                        handle.cancel();
                        deadline = Some(Instant::now() + config.runner.grace_period());
                    }
                    Err(e) => warn!(error = %e, "unable to listen for Ctrl-C"),
                }
            }
        }
    };

    let outcome = match outcome {
        Some(outcome) => outcome,
        None => {
            handle.shutdown(std::time::Duration::ZERO).await;
            RunOutcome::Stopped
        }
    };

    let summary = matrix.summary();
    reporter.print_matrix(&spec, &matrix);
    reporter.print_summary(&summary, &outcome);

    Ok(outcome == RunOutcome::Completed && summary.all_passed())
}

pub fn convert_document(path: &Path, to: OutputFormat, output: Option<&Path>) -> Result<()> {
    let spec = convert::parse(&read_file(path)?)?;
    let document = Exporter::render(&spec, to.into())?;
    emit(&document, output)
}

/// 解析 "role=path"。没有 role 时返回 None
pub fn parse_merge_input(arg: &str) -> (Option<String>, PathBuf) {
    match arg.split_once('=') {
        Some((role, path)) if !role.trim().is_empty() => {
            (Some(role.trim().to_string()), PathBuf::from(path.trim()))
        }
        _ => (None, PathBuf::from(arg.trim())),
    }
}

fn load_role_collections(inputs: &[String]) -> Result<Vec<RoleCollection>> {
    let mut collections = Vec::with_capacity(inputs.len());
    for input in inputs {
        let (role, path) = parse_merge_input(input);
        let collection = convert::parse_collection(&read_file(&path)?)
            .with_context(|| format!("{} is not a Postman collection", path.display()))?;
        let role = match role {
            Some(role) => role,
            None => {
                let name = collection["info"]["name"].as_str().unwrap_or_default();
                suggest_role_name(name)
            }
        };
        if collections.iter().any(|c: &RoleCollection| c.role == role) {
            bail!("role '{}' is given more than once", role);
        }
        collections.push(RoleCollection::new(role, collection));
    }
    Ok(collections)
}

pub fn merge_collections(inputs: &[String], output: Option<&Path>, analyze: bool) -> Result<()> {
    let collections = load_role_collections(inputs)?;

    if analyze {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Roles", "Endpoints"]);
        for group in analyze_access(&collections) {
            let roles: Vec<&str> = group.roles.iter().map(String::as_str).collect();
            let endpoints: Vec<String> = group
                .endpoints
                .iter()
                .map(|(method, path)| format!("{} {}", method, path))
                .collect();
            table.add_row(vec![roles.join(", "), endpoints.join("\n")]);
        }
        println!("{}", table);
        return Ok(());
    }

    let spec = merge_multi(&collections);
    info!(
        roles = spec.roles.len(),
        endpoints = spec.endpoints.len(),
        "merged collections"
    );
    emit(&Exporter::to_authmatrix(&spec)?, output)
}

pub fn split_collections(path: &Path, out_dir: &Path) -> Result<()> {
    let spec = convert::parse(&read_file(path)?)?;
    let written = Exporter::write_per_role(&spec, out_dir)?;
    if written.is_empty() {
        println!("{}", "No role expects a 2xx response, nothing written".yellow());
    }
    for path in written {
        println!(" {} {}", "✓".green(), path.display());
    }
    Ok(())
}
