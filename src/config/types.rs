//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 主配置结构，包含全局配置和端点列表
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 待探测的端点URL列表
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 两轮探测之间的间隔（秒），0 表示连续探测
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// 请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    /// 慢响应阈值（毫秒）
    #[serde(default = "default_slow_threshold")]
    pub slow_threshold_ms: u64,
    /// 工作协程数量
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 内部结果队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            request_timeout_seconds: default_timeout(),
            slow_threshold_ms: default_slow_threshold(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl GlobalConfig {
    /// 请求超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// 慢响应阈值
    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }

    /// 轮间间隔
    pub fn round_delay(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }
}

// 默认值函数
fn default_check_interval() -> u64 {
    30
}
fn default_timeout() -> u64 {
    5
}
fn default_slow_threshold() -> u64 {
    1000
}
fn default_workers() -> usize {
    5
}
fn default_queue_capacity() -> usize {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.global.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.global.workers == 0 {
        return Err("工作协程数量不能为0".to_string());
    }

    if config.global.queue_capacity == 0 {
        return Err("队列容量不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    if config.endpoints.is_empty() {
        return Err("至少需要配置一个端点".to_string());
    }

    for url in &config.endpoints {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(format!("端点 {url} 的URL格式无效"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            global: GlobalConfig::default(),
            endpoints: vec![
                "https://example.com/health".to_string(),
                "http://localhost:8080/ping".to_string(),
            ],
        }
    }

    #[test]
    fn test_config_serialization() {
        let config = create_test_config();

        let serialized = toml::to_string(&config).expect("序列化失败");
        assert!(!serialized.is_empty());

        let deserialized: Config = toml::from_str(&serialized).expect("反序列化失败");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_validation() {
        let config = create_test_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_validation_empty_endpoints() {
        let mut config = create_test_config();
        config.endpoints.clear();

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("至少需要配置一个端点"));
    }

    #[test]
    fn test_config_validation_invalid_url() {
        let mut config = create_test_config();
        config.endpoints.push("ftp://example.com".to_string());

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("URL格式无效"));
    }

    #[test]
    fn test_config_validation_zero_workers() {
        let mut config = create_test_config();
        config.global.workers = 0;

        assert!(validate_config(&config).unwrap_err().contains("工作协程"));
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = create_test_config();
        config.global.log_level = "verbose".to_string();

        assert!(validate_config(&config).unwrap_err().contains("日志级别"));
    }

    #[test]
    fn test_default_config_requires_endpoints() {
        let config = Config::default();

        assert!(config.endpoints.is_empty());
        assert_eq!(config.global, GlobalConfig::default());
        assert!(validate_config(&config)
            .unwrap_err()
            .contains("至少需要配置一个端点"));
    }

    #[test]
    fn test_zero_interval_is_allowed() {
        let mut config = create_test_config();
        config.global.check_interval_seconds = 0;

        assert!(validate_config(&config).is_ok());
        assert!(config.global.round_delay().is_zero());
    }

    #[test]
    fn test_default_values() {
        let global = GlobalConfig::default();

        assert_eq!(global.check_interval_seconds, 30);
        assert_eq!(global.request_timeout_seconds, 5);
        assert_eq!(global.slow_threshold_ms, 1000);
        assert_eq!(global.workers, 5);
        assert_eq!(global.queue_capacity, 1);
        assert_eq!(global.log_level, "info");
        assert_eq!(global.slow_threshold(), Duration::from_secs(1));
        assert_eq!(global.request_timeout(), Duration::from_secs(5));
    }
}
