//! Endpoint Vitals - 并发HTTP端点健康探测工具
//!
//! 固定数量的工作协程循环探测一组HTTP端点，结果经有界队列汇入唯一的报告器：
//! - 每个结果恰好报告一次
//! - 健康状态转换（DOWN/UP）检测与回调
//! - 支持外部取消与内部停止两种退出路径
//! - TOML/JSON配置与环境变量覆盖
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;

// 重新导出主要类型
pub use config::{Config, GlobalConfig};
pub use error::VitalsError;
pub use health::{
    AggregateStats, Aggregator, AggregatorOptions, AggregatorState, ConsoleReporter,
    HealthReporter, HttpProbe, Outcome, Probe, Signal,
};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
