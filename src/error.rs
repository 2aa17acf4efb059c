//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use crate::health::aggregator::AggregatorState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Endpoint Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum VitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 聚合器相关错误
    #[error("聚合器错误: {0}")]
    Aggregator(#[from] AggregatorError),

    /// 报告相关错误
    #[error("报告错误: {0}")]
    Report(#[from] ReportError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 单次探测失败的原因
///
/// 探测失败不会作为错误向上传播，而是记录在 [`Outcome`](crate::health::Outcome) 中。
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProbeError {
    /// 请求构建失败（URL无效等）
    #[error("failed to create request: {0}")]
    InvalidRequest(String),

    /// 网络/传输层失败
    #[error("request failed: {0}")]
    Transport(String),

    /// 请求超时
    #[error("request timeout")]
    Timeout,

    /// 外部取消信号触发
    #[error("request cancelled")]
    Cancelled,

    /// 收到响应但状态码 >= 400
    #[error("HTTP {status}: {reason}")]
    HttpStatus { status: u16, reason: String },
}

impl ProbeError {
    /// 是否为HTTP状态码失败（服务器已返回响应）
    pub fn is_http_status(&self) -> bool {
        matches!(self, ProbeError::HttpStatus { .. })
    }
}

/// 报告错误类型
#[derive(Error, Debug)]
pub enum ReportError {
    /// 输出目标写入失败
    #[error("报告输出失败: {0}")]
    SinkError(String),
}

/// 聚合器错误类型
#[derive(Error, Debug)]
pub enum AggregatorError {
    /// 非法的状态转换
    #[error("无法在 {from} 状态下执行 {action}")]
    InvalidTransition {
        from: AggregatorState,
        action: &'static str,
    },

    /// 没有配置端点
    #[error("至少需要一个端点")]
    NoEndpoints,

    /// 工作协程数量为0
    #[error("工作协程数量不能为0")]
    NoWorkers,

    /// 内部任务异常退出
    #[error("内部任务异常退出: {0}")]
    TaskFailed(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, VitalsError>;
