//! 结果报告器
//!
//! 消费探测结果流，维护原子聚合计数，并按端点检测状态转换（正常⇄异常）。
//!
//! 报告器只由聚合器的单个消费任务驱动：`report` 接收 `&mut self`，
//! 报告器被移动进消费任务后，最近结果表不可能被并发写入。
//! 统计计数通过 [`StatsHandle`] 共享，可在任意时刻读取。

use crate::error::ReportError;
use crate::health::result::{AggregateStats, Outcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 状态转换回调函数类型
pub type TransitionCallback = Arc<dyn Fn(&TransitionEvent) + Send + Sync>;

/// 报告器trait
pub trait HealthReporter: Send + 'static {
    /// 报告一次探测结果
    fn report(&mut self, outcome: Outcome) -> Result<(), ReportError>;

    /// 获取当前统计快照
    fn get_stats(&self) -> AggregateStats;

    /// 获取可跨任务共享的统计句柄
    fn stats_handle(&self) -> StatsHandle;
}

/// 原子聚合计数器
#[derive(Debug, Default)]
struct StatsCounters {
    success: AtomicU64,
    failure: AtomicU64,
    slow: AtomicU64,
    latency_micros: AtomicU64,
}

/// 共享统计句柄
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    counters: Arc<StatsCounters>,
}

impl StatsHandle {
    /// 创建新的统计句柄
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次探测结果
    pub fn record(&self, outcome: &Outcome) {
        let micros = u64::try_from(outcome.response_time.as_micros()).unwrap_or(u64::MAX);
        self.counters
            .latency_micros
            .fetch_add(micros, Ordering::Relaxed);

        if outcome.is_slow {
            self.counters.slow.fetch_add(1, Ordering::Relaxed);
        }

        // 成功/失败计数最后更新，总数由二者相加得出
        if outcome.is_success() {
            self.counters.success.fetch_add(1, Ordering::AcqRel);
        } else {
            self.counters.failure.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// 读取统计快照
    pub fn snapshot(&self) -> AggregateStats {
        let success_count = self.counters.success.load(Ordering::Acquire);
        let failure_count = self.counters.failure.load(Ordering::Acquire);
        let slow_count = self.counters.slow.load(Ordering::Relaxed);
        let latency_micros = self.counters.latency_micros.load(Ordering::Relaxed);
        let total_checks = success_count + failure_count;

        let average_latency = if total_checks == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(latency_micros / total_checks)
        };

        AggregateStats {
            total_checks,
            success_count,
            failure_count,
            slow_count,
            average_latency,
        }
    }
}

/// 状态转换方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    /// 成功 → 失败
    Down,
    /// 失败 → 成功
    Up,
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionKind::Down => write!(f, "DOWN"),
            TransitionKind::Up => write!(f, "UP"),
        }
    }
}

/// 状态转换事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    /// 端点URL
    pub url: String,
    /// 转换方向
    pub kind: TransitionKind,
    /// 上一次结果的失败描述
    pub previous_failure: Option<String>,
    /// 本次结果的失败描述
    pub current_failure: Option<String>,
    /// 本次探测时间
    pub timestamp: DateTime<Utc>,
}

/// 比较同一端点相邻两次结果，判断是否发生状态转换
pub fn detect_transition(previous: Option<&Outcome>, current: &Outcome) -> Option<TransitionEvent> {
    let previous = previous?;
    let kind = match (previous.is_success(), current.is_success()) {
        (true, false) => TransitionKind::Down,
        (false, true) => TransitionKind::Up,
        _ => return None,
    };

    Some(TransitionEvent {
        url: current.url.clone(),
        kind,
        previous_failure: previous.failure_message(),
        current_failure: current.failure_message(),
        timestamp: current.timestamp,
    })
}

/// 控制台报告器
pub struct ConsoleReporter {
    /// 统计计数
    stats: StatsHandle,
    /// 每个端点最近一次结果
    last_results: HashMap<String, Outcome>,
    /// 状态转换回调
    transition_callback: Option<TransitionCallback>,
}

impl ConsoleReporter {
    /// 创建新的控制台报告器
    pub fn new() -> Self {
        Self {
            stats: StatsHandle::new(),
            last_results: HashMap::new(),
            transition_callback: None,
        }
    }

    /// 设置状态转换回调
    pub fn with_transition_callback(mut self, callback: TransitionCallback) -> Self {
        self.transition_callback = Some(callback);
        self
    }

    /// 获取端点最近一次结果
    pub fn last_result(&self, url: &str) -> Option<&Outcome> {
        self.last_results.get(url)
    }

    /// 已跟踪的端点数量
    pub fn tracked_endpoints(&self) -> usize {
        self.last_results.len()
    }

    fn emit_transition(&self, event: &TransitionEvent) {
        match event.kind {
            TransitionKind::Down => warn!(
                url = %event.url,
                failure = event.current_failure.as_deref().unwrap_or(""),
                "端点状态变化: UP -> DOWN"
            ),
            TransitionKind::Up => info!(
                url = %event.url,
                previous_failure = event.previous_failure.as_deref().unwrap_or(""),
                "端点状态变化: DOWN -> UP"
            ),
        }

        if let Some(ref callback) = self.transition_callback {
            callback(event);
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthReporter for ConsoleReporter {
    fn report(&mut self, outcome: Outcome) -> Result<(), ReportError> {
        self.stats.record(&outcome);

        if let Some(ref failure) = outcome.failure {
            warn!(url = %outcome.url, status = outcome.status_code, "端点异常: {}", failure);
        }

        if outcome.is_slow {
            warn!(
                url = %outcome.url,
                elapsed_ms = outcome.response_time_ms(),
                "端点响应缓慢"
            );
        }

        if let Some(event) = detect_transition(self.last_results.get(&outcome.url), &outcome) {
            self.emit_transition(&event);
        }

        self.last_results.insert(outcome.url.clone(), outcome);
        Ok(())
    }

    fn get_stats(&self) -> AggregateStats {
        self.stats.snapshot()
    }

    fn stats_handle(&self) -> StatsHandle {
        self.stats.clone()
    }
}
