//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, FileConfigLoader};
use crate::error::Result;
use crate::health::{
    build_probes, AggregateStats, Aggregator, AggregatorOptions, ConsoleReporter, Outcome,
    Signal, SignalTrigger, TransitionEvent,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// `init` 命令写出的默认配置
pub const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../../templates/config.toml");

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载命令使用的配置
///
/// 显式指定的配置文件必须存在；使用默认路径时文件缺失则回退到默认值，
/// 两种情况都会应用环境变量覆盖。
pub async fn load_config(args: &Args) -> Result<Config> {
    let loader = FileConfigLoader::new(true).with_env_overrides();
    match &args.config {
        Some(path) => loader.load_from_file(path).await,
        None => loader.load_or_default(args.get_config_path()).await,
    }
}

/// 打印聚合统计
pub fn print_stats(stats: &AggregateStats, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(stats)?);
        }
        OutputFormat::Text => {
            println!("探测统计:");
            println!("  总检测次数: {}", stats.total_checks);
            println!("  成功: {}", stats.success_count);
            println!("  失败: {}", stats.failure_count);
            println!("  慢响应: {}", stats.slow_count);
            println!("  成功率: {:.1}%", stats.success_rate());
            println!("  平均响应时间: {}ms", stats.average_latency.as_millis());
        }
    }
    Ok(())
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件
    ///
    /// # 返回
    /// * `Result<()>` - 文件已存在且未指定 `force` 时不做任何修改
    pub async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, DEFAULT_CONFIG_TEMPLATE).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加需要探测的端点");

        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            self.validate_config_file(&config_file, *verbose).await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = FileConfigLoader::new(true).with_env_overrides();
        let config = loader.load_from_file(config_path).await?;

        if verbose {
            println!("配置验证通过！");
            println!("全局配置:");
            println!("  轮间间隔: {}秒", config.global.check_interval_seconds);
            println!("  请求超时: {}秒", config.global.request_timeout_seconds);
            println!("  慢响应阈值: {}毫秒", config.global.slow_threshold_ms);
            println!("  工作协程: {}", config.global.workers);
            println!("  队列容量: {}", config.global.queue_capacity);
            println!("  日志级别: {}", config.global.log_level);

            println!("端点:");
            for (i, url) in config.endpoints.iter().enumerate() {
                println!("  {}. {}", i + 1, url);
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个端点", config.endpoints.len());
        }

        Ok(())
    }
}

/// 单次检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { format } = &args.command {
            let config = load_config(args).await?;
            let results = self.check_once(&config).await?;
            self.print_results(&results, *format)
        } else {
            Ok(())
        }
    }
}

impl CheckCommand {
    /// 并发探测每个端点一次
    pub async fn check_once(&self, config: &Config) -> Result<Vec<Outcome>> {
        let probes = build_probes(config)?;
        let never = Signal::never();

        Ok(join_all(probes.iter().map(|probe| probe.ping(&never))).await)
    }

    fn print_results(&self, results: &[Outcome], format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(results)?);
            }
            OutputFormat::Text => {
                for outcome in results {
                    let status_icon = if outcome.is_success() { "✓" } else { "✗" };
                    let slow = if outcome.is_slow { " (慢)" } else { "" };
                    println!(
                        "{} {} - {} - {}ms{}",
                        status_icon,
                        outcome.url,
                        outcome.status_code,
                        outcome.response_time_ms(),
                        slow
                    );

                    if let Some(error) = outcome.failure_message() {
                        println!("  错误: {error}");
                    }
                }
            }
        }
        Ok(())
    }
}

/// 持续探测命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Run {
            workers,
            interval,
            duration,
            format,
        } = &args.command
        {
            let mut config = load_config(args).await?;

            if let Some(workers) = workers {
                config.global.workers = *workers;
            }
            if let Some(interval) = interval {
                config.global.check_interval_seconds = *interval;
            }
            FileConfigLoader::new(false).validate(&config)?;

            let stats = self
                .run(&config, duration.map(Duration::from_secs), *format)
                .await?;
            print_stats(&stats, *format)
        } else {
            Ok(())
        }
    }
}

impl RunCommand {
    /// 启动聚合器，等待Ctrl+C或运行时长到期后停止
    async fn run(
        &self,
        config: &Config,
        duration: Option<Duration>,
        format: OutputFormat,
    ) -> Result<AggregateStats> {
        let mut reporter = ConsoleReporter::new();
        if format == OutputFormat::Text {
            reporter = reporter.with_transition_callback(Arc::new(print_transition));
        }

        let aggregator = Aggregator::new(
            build_probes(config)?,
            reporter,
            AggregatorOptions {
                workers: config.global.workers,
                round_delay: config.global.round_delay(),
                queue_capacity: config.global.queue_capacity,
            },
        )?;

        let (cancel_trigger, cancel) = Signal::new();
        aggregator.start(cancel).await?;
        info!("开始探测 {} 个端点", config.endpoints.len());

        wait_for_shutdown(duration, &cancel_trigger).await;

        aggregator.stop().await
    }
}

fn print_transition(event: &TransitionEvent) {
    match &event.current_failure {
        Some(reason) => println!("[{}] {}: {}", event.kind, event.url, reason),
        None => println!("[{}] {}", event.kind, event.url),
    }
}

/// 等待Ctrl+C或运行时长到期
///
/// 运行时长到期时触发外部取消信号，中止进行中的请求。
async fn wait_for_shutdown(duration: Option<Duration>, cancel_trigger: &SignalTrigger) {
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                info!("收到中断信号，正在停止...");
                return;
            }
            Err(err) => error!("监听中断信号失败: {}", err),
        },
        _ = &mut deadline => {
            info!("运行时长到期，取消探测");
            cancel_trigger.fire();
            return;
        }
    }

    (&mut deadline).await;
    info!("运行时长到期，取消探测");
    cancel_trigger.fire();
}
