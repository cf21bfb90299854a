mod cli;

use anyhow::Result;
use authmatrix::config::ConfigLoader;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    authmatrix::logger::init_logger(if cli.verbose { "debug" } else { "warn" });

    let config = ConfigLoader::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { path, base_url } => {
            let passed = cli::run_matrix(&path, base_url, &config, cli.verbose).await?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::Convert { path, to, output } => {
            cli::convert_document(&path, to, output.as_deref())?;
        }
        Commands::Merge {
            inputs,
            output,
            analyze,
        } => {
            cli::merge_collections(&inputs, output.as_deref(), analyze)?;
        }
        Commands::Split { path, out_dir } => {
            cli::split_collections(&path, &out_dir)?;
        }
    }
    Ok(())
}
