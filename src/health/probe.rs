//! HTTP探测器实现
//!
//! 对单个端点执行一次GET健康检测，所有失败都编码在返回的 [`Outcome`] 中

use crate::config::Config;
use crate::error::{ProbeError, Result};
use crate::health::result::{Outcome, DETAIL_CONTENT_LENGTH, DETAIL_CONTENT_TYPE};
use crate::health::signal::Signal;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response, Url};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::trace;

/// 探测器trait，定义单次检测接口
#[async_trait]
pub trait Probe: Send + Sync {
    /// 被探测的端点
    fn endpoint(&self) -> &str;

    /// 执行一次探测
    ///
    /// # 参数
    /// * `cancel` - 外部取消信号，触发时中止进行中的请求
    ///
    /// # 返回
    /// * `Outcome` - 探测结果，永不返回错误
    async fn ping(&self, cancel: &Signal) -> Outcome;
}

/// HTTP探测器实现
#[derive(Debug, Clone)]
pub struct HttpProbe {
    /// 端点URL
    url: String,
    /// 单次请求超时
    timeout: Duration,
    /// 慢响应阈值
    slow_threshold: Duration,
    /// HTTP客户端
    client: Client,
}

impl HttpProbe {
    /// 创建新的HTTP探测器
    ///
    /// # 参数
    /// * `url` - 端点URL
    /// * `timeout` - 单次请求超时
    /// * `slow_threshold` - 慢响应阈值
    /// * `client` - 共享的HTTP客户端
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        slow_threshold: Duration,
        client: Client,
    ) -> Self {
        Self {
            url: url.into(),
            timeout,
            slow_threshold,
            client,
        }
    }

    /// 构建探测器共用的HTTP客户端
    pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
        Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
    }

    /// 修改超时时间
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 处理收到的HTTP响应
    fn process_response(&self, outcome: Outcome, response: Response) -> Outcome {
        let status = response.status();
        let content_length = response
            .content_length()
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::from(-1));
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        // 只关心响应头，丢弃响应体
        drop(response);

        let mut outcome = outcome
            .with_status_code(status.as_u16())
            .with_detail(DETAIL_CONTENT_LENGTH, content_length)
            .with_detail(DETAIL_CONTENT_TYPE, serde_json::Value::String(content_type));

        if status.as_u16() >= 400 {
            outcome = outcome.with_failure(ProbeError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        outcome
    }

    /// 将reqwest错误转换为探测失败原因
    fn classify_error(error: &reqwest::Error) -> ProbeError {
        if error.is_timeout() {
            ProbeError::Timeout
        } else if error.is_builder() {
            ProbeError::InvalidRequest(error.to_string())
        } else {
            ProbeError::Transport(error.to_string())
        }
    }
}

/// 根据配置为每个端点创建探测器，所有探测器共享同一个HTTP客户端
pub fn build_probes(config: &Config) -> Result<Vec<Arc<dyn Probe>>> {
    let timeout = config.global.request_timeout();
    let client = HttpProbe::build_client(timeout).map_err(anyhow::Error::from)?;

    Ok(config
        .endpoints
        .iter()
        .map(|url| {
            Arc::new(HttpProbe::new(
                url.clone(),
                timeout,
                config.global.slow_threshold(),
                client.clone(),
            )) as Arc<dyn Probe>
        })
        .collect())
}

#[async_trait]
impl Probe for HttpProbe {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn ping(&self, cancel: &Signal) -> Outcome {
        let start = Instant::now();
        let outcome = Outcome::new(self.url.clone(), Utc::now());

        let url = match Url::parse(&self.url) {
            Ok(url) => url,
            Err(e) => {
                return outcome
                    .with_response_time(start.elapsed())
                    .with_failure(ProbeError::InvalidRequest(e.to_string()))
                    .classify_slow(self.slow_threshold);
            }
        };

        let mut cancel = cancel.clone();
        let request = self.client.get(url).timeout(self.timeout).send();

        let result = tokio::select! {
            res = timeout(self.timeout, request) => match res {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(Self::classify_error(&e)),
                Err(_) => Err(ProbeError::Timeout),
            },
            _ = cancel.fired() => Err(ProbeError::Cancelled),
        };

        let outcome = outcome.with_response_time(start.elapsed());
        let outcome = match result {
            Ok(response) => self.process_response(outcome, response),
            Err(failure) => outcome.with_failure(failure),
        };

        trace!(
            url = %self.url,
            status = outcome.status_code,
            elapsed_ms = outcome.response_time_ms(),
            "探测完成"
        );

        outcome.classify_slow(self.slow_threshold)
    }
}
