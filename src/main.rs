//! Endpoint Vitals 主程序入口
//!
//! 并发HTTP端点健康探测工具

use anyhow::{Context, Result};
use clap::Parser;
use endpoint_vitals::cli::args::{Args, Commands};
use endpoint_vitals::cli::commands::{
    load_config, CheckCommand, Command, InitCommand, RunCommand, ValidateCommand, VersionCommand,
};
use endpoint_vitals::logging::{LogConfig, LoggingSystem};
use log::LevelFilter;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = LogConfig {
        level: resolve_log_level(&args).await,
        file_path: args.log_file.clone(),
        console: true,
        json_format: args.json_logs,
        ..Default::default()
    };

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Endpoint Vitals v{} 启动", endpoint_vitals::VERSION);

    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        eprintln!("错误: {e}");
        std::process::exit(1);
    }

    Ok(())
}

/// 命令行级别优先，其次是配置文件中的级别
async fn resolve_log_level(args: &Args) -> LevelFilter {
    if let Some(level) = args.log_level {
        return level.into();
    }

    match &args.command {
        Commands::Run { .. } | Commands::Check { .. } => load_config(args)
            .await
            .map(|config| LogConfig::parse_level(&config.global.log_level))
            .unwrap_or(LevelFilter::Info),
        _ => LevelFilter::Info,
    }
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Run { .. } => Box::new(RunCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}
