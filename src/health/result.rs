//! 探测结果数据结构
//!
//! 定义单次探测结果 [`Outcome`] 与聚合统计快照 [`AggregateStats`]

use crate::error::ProbeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 详情字段：响应体长度
pub const DETAIL_CONTENT_LENGTH: &str = "content_length";
/// 详情字段：Content-Type 响应头
pub const DETAIL_CONTENT_TYPE: &str = "content_type";

/// 单次探测结果
///
/// 由探测器生成后不可变，移交给报告器后由报告器持有。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// 端点URL
    pub url: String,
    /// HTTP状态码，未到达服务器时为0
    pub status_code: u16,
    /// 响应时间
    #[serde(with = "duration_serde")]
    pub response_time: Duration,
    /// 失败原因，为空表示成功
    pub failure: Option<ProbeError>,
    /// 探测开始时间
    pub timestamp: DateTime<Utc>,
    /// 额外详情（content_length、content_type 等）
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
    /// 是否为慢响应
    pub is_slow: bool,
}

impl Outcome {
    /// 创建新的探测结果，默认为成功、状态码0
    pub fn new(url: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            status_code: 0,
            response_time: Duration::ZERO,
            failure: None,
            timestamp,
            details: HashMap::new(),
            is_slow: false,
        }
    }

    /// 设置HTTP状态码
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// 设置响应时间
    pub fn with_response_time(mut self, response_time: Duration) -> Self {
        self.response_time = response_time;
        self
    }

    /// 设置失败原因
    pub fn with_failure(mut self, failure: ProbeError) -> Self {
        self.failure = Some(failure);
        self
    }

    /// 添加详情
    pub fn with_detail(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    /// 按阈值标记慢响应
    pub fn classify_slow(mut self, slow_threshold: Duration) -> Self {
        self.is_slow = self.response_time > slow_threshold;
        self
    }

    /// 是否成功
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// 获取响应时间（毫秒）
    pub fn response_time_ms(&self) -> u64 {
        self.response_time.as_millis() as u64
    }

    /// 失败描述，成功时返回 None
    pub fn failure_message(&self) -> Option<String> {
        self.failure.as_ref().map(|f| f.to_string())
    }

    /// 转换为JSON字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Duration序列化模块
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// 聚合统计快照
///
/// 各字段分别读取，整体不是原子快照；`total_checks` 始终等于成功与失败之和。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// 总检测次数
    pub total_checks: u64,
    /// 成功次数
    pub success_count: u64,
    /// 失败次数
    pub failure_count: u64,
    /// 慢响应次数
    pub slow_count: u64,
    /// 平均响应时间
    #[serde(with = "duration_serde")]
    pub average_latency: Duration,
}

impl AggregateStats {
    /// 成功率（百分比）
    pub fn success_rate(&self) -> f64 {
        if self.total_checks == 0 {
            0.0
        } else {
            (self.success_count as f64 / self.total_checks as f64) * 100.0
        }
    }
}
