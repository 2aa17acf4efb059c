//! 配置加载器实现
//!
//! 提供TOML/JSON配置文件解析、环境变量替换、环境变量覆盖和错误处理功能

use crate::config::types::{validate_config, Config, GlobalConfig};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 端点列表覆盖（逗号分隔）
pub const ENV_URLS: &str = "HEALTH_CHECK_URLS";
/// 轮间间隔覆盖（秒）
pub const ENV_CHECK_INTERVAL: &str = "CHECK_INTERVAL";
/// 请求超时覆盖（秒）
pub const ENV_TIMEOUT: &str = "TIMEOUT_SECONDS";
/// 慢响应阈值覆盖（毫秒）
pub const ENV_SLOW_THRESHOLD: &str = "SLOW_THRESHOLD";

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML格式
    Toml,
    /// JSON格式
    Json,
}

impl ConfigFormat {
    /// 根据文件扩展名判断格式，未知扩展名按TOML处理
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载配置
    ///
    /// # 参数
    /// * `content` - 配置文件内容
    /// * `format` - 内容格式
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_string(&self, content: &str, format: ConfigFormat) -> Result<Config>;

    /// 验证配置
    fn validate(&self, config: &Config) -> Result<()>;
}

/// 文件配置加载器实现
#[derive(Debug, Clone)]
pub struct FileConfigLoader {
    /// 是否启用 `${VAR}` 环境变量替换
    enable_env_substitution: bool,
    /// 是否应用环境变量覆盖
    enable_env_overrides: bool,
}

impl FileConfigLoader {
    /// 创建新的配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
            enable_env_overrides: false,
        }
    }

    /// 启用环境变量覆盖
    pub fn with_env_overrides(mut self) -> Self {
        self.enable_env_overrides = true;
        self
    }

    /// 加载配置，文件不存在时使用默认值
    ///
    /// 默认值同样会应用环境变量覆盖并经过验证。
    pub async fn load_or_default<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();
        if path.exists() {
            return self.load_from_file(path).await;
        }

        tracing::info!("配置文件不存在，使用默认配置: {}", path.display());
        let mut config = Config::default();
        self.finish(&mut config)?;
        Ok(config)
    }

    /// 替换字符串中的环境变量
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        // 匹配 ${VAR_NAME} 格式的环境变量
        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {e}")))?;

        let mut result = content.to_string();

        for captures in env_var_regex.captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            let value = std::env::var(var_name).map_err(|_| ConfigError::EnvVarError {
                var: var_name.to_string(),
            })?;
            result = result.replace(full_match, &value);
        }

        Ok(result)
    }

    /// 解析配置内容
    fn parse(&self, content: &str, format: ConfigFormat) -> Result<Config> {
        let processed_content = self.substitute_env_vars(content)?;

        let config = match format {
            ConfigFormat::Toml => toml::from_str(&processed_content)
                .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {e}")))?,
            ConfigFormat::Json => parse_json(&processed_content)
                .map_err(|e| ConfigError::ParseError(format!("JSON解析失败: {e}")))?,
        };

        Ok(config)
    }

    /// 应用环境变量覆盖并验证
    fn finish(&self, config: &mut Config) -> Result<()> {
        if self.enable_env_overrides {
            apply_env_overrides(config);
        }
        self.validate(config)
    }
}

#[async_trait]
impl ConfigLoader for FileConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {e}")))?;

        let mut config = self.parse(&content, ConfigFormat::from_path(path))?;
        self.finish(&mut config)?;

        log::info!("成功加载配置文件: {}", path.display());
        log::debug!("配置内容: {:?}", config);

        Ok(config)
    }

    async fn load_from_string(&self, content: &str, format: ConfigFormat) -> Result<Config> {
        let mut config = self.parse(content, format)?;
        self.finish(&mut config)?;

        log::debug!("成功解析配置字符串");

        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 扁平JSON配置格式：`urls`、`check_interval`、`timeout_seconds`、`slow_threshold`
#[derive(Debug, Deserialize)]
struct FlatJsonConfig {
    urls: Vec<String>,
    check_interval: Option<u64>,
    timeout_seconds: Option<u64>,
    slow_threshold: Option<u64>,
}

impl From<FlatJsonConfig> for Config {
    fn from(flat: FlatJsonConfig) -> Self {
        let defaults = GlobalConfig::default();
        Config {
            endpoints: flat.urls,
            global: GlobalConfig {
                check_interval_seconds: flat
                    .check_interval
                    .unwrap_or(defaults.check_interval_seconds),
                request_timeout_seconds: flat
                    .timeout_seconds
                    .unwrap_or(defaults.request_timeout_seconds),
                slow_threshold_ms: flat.slow_threshold.unwrap_or(defaults.slow_threshold_ms),
                ..defaults
            },
        }
    }
}

/// 解析JSON配置，顶层带 `urls` 时按扁平格式处理
fn parse_json(content: &str) -> std::result::Result<Config, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    if value.get("urls").is_some() {
        Ok(serde_json::from_value::<FlatJsonConfig>(value)?.into())
    } else {
        serde_json::from_value(value)
    }
}

/// 应用环境变量覆盖，无法解析的数值被忽略
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(urls) = std::env::var(ENV_URLS) {
        let endpoints: Vec<String> = urls
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();
        if !endpoints.is_empty() {
            config.endpoints = endpoints;
        }
    }

    if let Some(interval) = env_number(ENV_CHECK_INTERVAL) {
        config.global.check_interval_seconds = interval;
    }
    if let Some(timeout) = env_number(ENV_TIMEOUT) {
        config.global.request_timeout_seconds = timeout;
    }
    if let Some(threshold) = env_number(ENV_SLOW_THRESHOLD) {
        config.global.slow_threshold_ms = threshold;
    }
}

fn env_number(name: &str) -> Option<u64> {
    match std::env::var(name) {
        Ok(value) => match value.trim().parse() {
            Ok(number) => Some(number),
            Err(_) => {
                log::warn!("忽略无效的环境变量 {name}={value}");
                None
            }
        },
        Err(_) => None,
    }
}

/// 获取默认配置文件路径
///
/// 依次检查当前目录的 `config.toml`、`config.json`，
/// 都不存在时使用用户配置目录下的 `endpoint-vitals/config.toml`。
pub fn get_default_config_path() -> PathBuf {
    for candidate in ["config.toml", "config.json"] {
        if Path::new(candidate).exists() {
            return PathBuf::from(candidate);
        }
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("endpoint-vitals").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}
