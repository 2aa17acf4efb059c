//! 聚合器模块
//!
//! 固定数量的工作协程循环探测全部端点，结果经内部队列汇入唯一的消费任务，
//! 由消费任务串行调用报告器。
//!
//! 状态机：`Created → Running → Stopping → Stopped`，非法转换返回
//! [`AggregatorError::InvalidTransition`]。
//!
//! 关闭协议：
//! - 工作协程在每轮开始及每个端点之前检查外部取消信号与内部停止信号；
//! - 监督任务等待全部工作协程退出后才关闭队列；
//! - 消费任务观察到信号后继续排空队列，直到队列关闭，保证每个结果恰好报告一次；
//! - 被外部取消中止的探测结果直接丢弃，不计入统计。

use crate::error::{AggregatorError, ProbeError, Result};
use crate::health::probe::Probe;
use crate::health::reporter::{HealthReporter, StatsHandle};
use crate::health::result::{AggregateStats, Outcome};
use crate::health::signal::{Signal, SignalTrigger, StopCause, StopSignals};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 聚合器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    /// 已创建，未启动任何任务
    Created,
    /// 运行中
    Running,
    /// 已发出停止信号，等待任务退出
    Stopping,
    /// 所有任务已退出
    Stopped,
}

impl std::fmt::Display for AggregatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregatorState::Created => write!(f, "created"),
            AggregatorState::Running => write!(f, "running"),
            AggregatorState::Stopping => write!(f, "stopping"),
            AggregatorState::Stopped => write!(f, "stopped"),
        }
    }
}

/// 聚合器运行参数
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// 工作协程数量
    pub workers: usize,
    /// 两轮探测之间的间隔，为0时连续探测
    pub round_delay: Duration,
    /// 内部队列容量
    pub queue_capacity: usize,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            workers: 5,
            round_delay: Duration::ZERO,
            queue_capacity: 1,
        }
    }
}

/// 运行中的任务句柄
struct RunningTasks {
    /// 内部停止信号触发端
    stop_trigger: SignalTrigger,
    /// 消费任务
    consumer: JoinHandle<()>,
    /// 监督任务，返回各工作协程的退出原因
    supervisor: JoinHandle<Vec<StopCause>>,
}

/// 聚合器内部状态
enum Phase<R> {
    Created(R),
    Running(RunningTasks),
    Stopping,
    Stopped,
}

impl<R> Phase<R> {
    fn state(&self) -> AggregatorState {
        match self {
            Phase::Created(_) => AggregatorState::Created,
            Phase::Running(_) => AggregatorState::Running,
            Phase::Stopping => AggregatorState::Stopping,
            Phase::Stopped => AggregatorState::Stopped,
        }
    }
}

/// 探测结果聚合器
pub struct Aggregator<R: HealthReporter> {
    /// 端点探测器列表
    probes: Arc<Vec<Arc<dyn Probe>>>,
    /// 运行参数
    options: AggregatorOptions,
    /// 统计句柄
    stats: StatsHandle,
    /// 状态机
    phase: Mutex<Phase<R>>,
}

impl<R: HealthReporter> Aggregator<R> {
    /// 创建新的聚合器
    ///
    /// # 参数
    /// * `probes` - 端点探测器列表
    /// * `reporter` - 结果报告器，启动后移交给消费任务
    /// * `options` - 运行参数
    ///
    /// # 返回
    /// * `Result<Self>` - 端点为空或工作协程数为0时返回错误
    pub fn new(
        probes: Vec<Arc<dyn Probe>>,
        reporter: R,
        options: AggregatorOptions,
    ) -> Result<Self> {
        if probes.is_empty() {
            return Err(AggregatorError::NoEndpoints.into());
        }
        if options.workers == 0 {
            return Err(AggregatorError::NoWorkers.into());
        }

        let stats = reporter.stats_handle();
        Ok(Self {
            probes: Arc::new(probes),
            options: AggregatorOptions {
                queue_capacity: options.queue_capacity.max(1),
                ..options
            },
            stats,
            phase: Mutex::new(Phase::Created(reporter)),
        })
    }

    /// 当前状态
    pub async fn state(&self) -> AggregatorState {
        self.phase.lock().await.state()
    }

    /// 当前统计快照
    pub fn get_stats(&self) -> AggregateStats {
        self.stats.snapshot()
    }

    /// 启动工作协程、消费任务与监督任务
    ///
    /// # 参数
    /// * `cancel` - 外部取消信号
    pub async fn start(&self, cancel: Signal) -> Result<()> {
        let mut phase = self.phase.lock().await;
        let reporter = match std::mem::replace(&mut *phase, Phase::Stopping) {
            Phase::Created(reporter) => reporter,
            other => {
                let from = other.state();
                *phase = other;
                return Err(AggregatorError::InvalidTransition {
                    from,
                    action: "start",
                }
                .into());
            }
        };

        let (stop_trigger, stop_signal) = Signal::new();
        let signals = StopSignals {
            external: cancel,
            internal: stop_signal,
        };
        let (tx, rx) = mpsc::channel(self.options.queue_capacity);

        info!(
            "启动聚合器，端点数量: {}，工作协程: {}",
            self.probes.len(),
            self.options.workers
        );

        let workers: Vec<JoinHandle<StopCause>> = (0..self.options.workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&self.probes),
                    tx.clone(),
                    signals.clone(),
                    self.options.round_delay,
                ))
            })
            .collect();

        let consumer = tokio::spawn(run_consumer(reporter, rx, signals));
        let supervisor = tokio::spawn(run_supervisor(workers, tx));

        *phase = Phase::Running(RunningTasks {
            stop_trigger,
            consumer,
            supervisor,
        });

        Ok(())
    }

    /// 停止聚合器并等待所有任务退出
    ///
    /// # 返回
    /// * `Result<AggregateStats>` - 停止后的最终统计
    pub async fn stop(&self) -> Result<AggregateStats> {
        let tasks = {
            let mut phase = self.phase.lock().await;
            match std::mem::replace(&mut *phase, Phase::Stopping) {
                Phase::Running(tasks) => tasks,
                other => {
                    let from = other.state();
                    *phase = other;
                    return Err(AggregatorError::InvalidTransition {
                        from,
                        action: "stop",
                    }
                    .into());
                }
            }
        };

        info!("停止聚合器");
        tasks.stop_trigger.fire();

        let mut task_error = None;
        match tasks.supervisor.await {
            Ok(causes) => debug!("工作协程已全部退出: {:?}", causes),
            Err(e) => {
                error!("监督任务异常退出: {}", e);
                task_error = Some(e.to_string());
            }
        }
        if let Err(e) = tasks.consumer.await {
            error!("消费任务异常退出: {}", e);
            task_error.get_or_insert(e.to_string());
        }

        *self.phase.lock().await = Phase::Stopped;

        if let Some(e) = task_error {
            return Err(AggregatorError::TaskFailed(e).into());
        }

        let stats = self.get_stats();
        info!(
            "聚合器已停止，总检测: {}，成功: {}，失败: {}",
            stats.total_checks, stats.success_count, stats.failure_count
        );
        Ok(stats)
    }
}

impl<R: HealthReporter> Drop for Aggregator<R> {
    fn drop(&mut self) {
        // 未调用 stop 就被丢弃时，通知任务自行退出
        if let Phase::Running(tasks) = self.phase.get_mut() {
            tasks.stop_trigger.fire();
        }
    }
}

/// 工作协程：循环探测全部端点直到任一信号触发
async fn run_worker(
    id: usize,
    probes: Arc<Vec<Arc<dyn Probe>>>,
    tx: mpsc::Sender<Outcome>,
    mut signals: StopSignals,
    round_delay: Duration,
) -> StopCause {
    debug!("工作协程 {} 已启动", id);

    let cause = 'rounds: loop {
        for probe in probes.iter() {
            if let Some(cause) = signals.check() {
                break 'rounds cause;
            }

            let outcome = probe.ping(&signals.external).await;

            // 被外部取消中止的探测没有结论，不进入队列
            if matches!(outcome.failure, Some(ProbeError::Cancelled)) {
                debug!("工作协程 {} 的探测被取消: {}", id, outcome.url);
                break 'rounds StopCause::Cancelled;
            }

            if tx.send(outcome).await.is_err() {
                // 消费任务只在队列关闭后退出，正常情况下不会发生
                warn!("工作协程 {} 发送结果失败，队列已关闭", id);
                break 'rounds signals.check().unwrap_or(StopCause::Stopped);
            }
        }

        if round_delay.is_zero() {
            continue;
        }
        tokio::select! {
            _ = tokio::time::sleep(round_delay) => {}
            cause = signals.wait() => break 'rounds cause,
        }
    };

    debug!("工作协程 {} 退出: {}", id, cause);
    cause
}

/// 消费任务：串行调用报告器，观察到信号后排空队列直至关闭
async fn run_consumer<R: HealthReporter>(
    mut reporter: R,
    mut rx: mpsc::Receiver<Outcome>,
    mut signals: StopSignals,
) {
    let mut draining = false;

    loop {
        let next = if draining {
            rx.recv().await
        } else {
            tokio::select! {
                biased;
                item = rx.recv() => item,
                cause = signals.wait() => {
                    debug!("消费任务收到信号 ({})，排空剩余结果", cause);
                    draining = true;
                    continue;
                }
            }
        };

        match next {
            Some(outcome) => {
                if let Err(e) = reporter.report(outcome) {
                    warn!("报告结果失败: {}", e);
                }
            }
            None => break,
        }
    }

    debug!("消费任务退出");
}

/// 监督任务：所有工作协程退出后关闭队列
async fn run_supervisor(
    workers: Vec<JoinHandle<StopCause>>,
    tx: mpsc::Sender<Outcome>,
) -> Vec<StopCause> {
    let causes = join_all(workers)
        .await
        .into_iter()
        .filter_map(|joined| match joined {
            Ok(cause) => Some(cause),
            Err(e) => {
                error!("工作协程异常退出: {}", e);
                None
            }
        })
        .collect();

    // 最后一个发送端在此丢弃，消费任务随后观察到队列关闭
    drop(tx);
    causes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VitalsError;
    use crate::health::reporter::ConsoleReporter;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// 不发起网络请求的探测器
    struct FakeProbe {
        url: String,
        healthy: bool,
        delay: Duration,
        pings: Arc<AtomicU64>,
    }

    impl FakeProbe {
        fn new(url: &str, healthy: bool, delay: Duration) -> (Arc<dyn Probe>, Arc<AtomicU64>) {
            let pings = Arc::new(AtomicU64::new(0));
            let probe = Arc::new(Self {
                url: url.to_string(),
                healthy,
                delay,
                pings: pings.clone(),
            });
            (probe, pings)
        }
    }

    #[async_trait]
    impl Probe for FakeProbe {
        fn endpoint(&self) -> &str {
            &self.url
        }

        async fn ping(&self, _cancel: &Signal) -> Outcome {
            tokio::time::sleep(self.delay).await;
            self.pings.fetch_add(1, Ordering::SeqCst);
            let outcome = Outcome::new(self.url.clone(), Utc::now())
                .with_response_time(self.delay);
            if self.healthy {
                outcome.with_status_code(200)
            } else {
                outcome.with_failure(ProbeError::Transport("down".to_string()))
            }
        }
    }

    /// 一直挂起直到外部取消的探测器
    struct HangingProbe {
        url: String,
    }

    #[async_trait]
    impl Probe for HangingProbe {
        fn endpoint(&self) -> &str {
            &self.url
        }

        async fn ping(&self, cancel: &Signal) -> Outcome {
            let mut cancel = cancel.clone();
            cancel.fired().await;
            Outcome::new(self.url.clone(), Utc::now()).with_failure(ProbeError::Cancelled)
        }
    }

    fn options(workers: usize) -> AggregatorOptions {
        AggregatorOptions {
            workers,
            ..Default::default()
        }
    }

    fn assert_invalid_transition(result: Result<impl std::fmt::Debug>, expected: AggregatorState) {
        match result {
            Err(VitalsError::Aggregator(AggregatorError::InvalidTransition { from, .. })) => {
                assert_eq!(from, expected)
            }
            other => panic!("期望非法状态转换错误，实际: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_new_rejects_empty_endpoints() {
        let result = Aggregator::new(Vec::new(), ConsoleReporter::new(), options(2));
        assert!(matches!(
            result,
            Err(VitalsError::Aggregator(AggregatorError::NoEndpoints))
        ));
    }

    #[tokio::test]
    async fn test_new_rejects_zero_workers() {
        let (probe, _) = FakeProbe::new("http://a", true, Duration::from_millis(1));
        let result = Aggregator::new(vec![probe], ConsoleReporter::new(), options(0));
        assert!(matches!(
            result,
            Err(VitalsError::Aggregator(AggregatorError::NoWorkers))
        ));
    }

    #[tokio::test]
    async fn test_state_machine_transitions() {
        let (probe, _) = FakeProbe::new("http://a", true, Duration::from_millis(1));
        let aggregator = Aggregator::new(vec![probe], ConsoleReporter::new(), options(1)).unwrap();

        assert_eq!(aggregator.state().await, AggregatorState::Created);
        assert_invalid_transition(aggregator.stop().await, AggregatorState::Created);

        aggregator.start(Signal::never()).await.unwrap();
        assert_eq!(aggregator.state().await, AggregatorState::Running);
        assert_invalid_transition(
            aggregator.start(Signal::never()).await,
            AggregatorState::Running,
        );

        aggregator.stop().await.unwrap();
        assert_eq!(aggregator.state().await, AggregatorState::Stopped);
        assert_invalid_transition(aggregator.stop().await, AggregatorState::Stopped);
        assert_invalid_transition(
            aggregator.start(Signal::never()).await,
            AggregatorState::Stopped,
        );
    }

    #[tokio::test]
    async fn test_every_outcome_reported_exactly_once() {
        let (up, up_pings) = FakeProbe::new("http://up", true, Duration::from_millis(1));
        let (down, down_pings) = FakeProbe::new("http://down", false, Duration::from_millis(2));
        let aggregator =
            Aggregator::new(vec![up, down], ConsoleReporter::new(), options(3)).unwrap();

        aggregator.start(Signal::never()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stats = aggregator.stop().await.unwrap();

        let up_count = up_pings.load(Ordering::SeqCst);
        let down_count = down_pings.load(Ordering::SeqCst);
        assert!(up_count > 0);
        assert!(down_count > 0);
        assert_eq!(stats.total_checks, up_count + down_count);
        assert_eq!(stats.success_count, up_count);
        assert_eq!(stats.failure_count, down_count);
    }

    #[tokio::test]
    async fn test_external_cancellation_ends_workers() {
        let (probe, pings) = FakeProbe::new("http://a", true, Duration::from_millis(1));
        let aggregator = Aggregator::new(vec![probe], ConsoleReporter::new(), options(2)).unwrap();
        let (cancel_trigger, cancel) = Signal::new();

        aggregator.start(cancel).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel_trigger.fire();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // 取消后探测次数不再增长
        let after_cancel = pings.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pings.load(Ordering::SeqCst), after_cancel);

        let stats = tokio::time::timeout(Duration::from_secs(1), aggregator.stop())
            .await
            .expect("取消后停止不应阻塞")
            .unwrap();
        assert_eq!(stats.total_checks, after_cancel);
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_probe() {
        let (probe, pings) = FakeProbe::new("http://slow", true, Duration::from_millis(100));
        let aggregator = Aggregator::new(vec![probe], ConsoleReporter::new(), options(1)).unwrap();

        aggregator.start(Signal::never()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stats = aggregator.stop().await.unwrap();

        // 进行中的探测完成后其结果仍被报告
        assert_eq!(pings.load(Ordering::SeqCst), 1);
        assert_eq!(stats.total_checks, 1);
    }

    #[tokio::test]
    async fn test_round_delay_throttles_probing() {
        let (probe, pings) = FakeProbe::new("http://a", true, Duration::ZERO);
        let aggregator = Aggregator::new(
            vec![probe],
            ConsoleReporter::new(),
            AggregatorOptions {
                workers: 1,
                round_delay: Duration::from_secs(60),
                queue_capacity: 1,
            },
        )
        .unwrap();

        aggregator.start(Signal::never()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = tokio::time::timeout(Duration::from_secs(1), aggregator.stop())
            .await
            .expect("停止应打断轮间等待")
            .unwrap();

        assert_eq!(pings.load(Ordering::SeqCst), 1);
        assert_eq!(stats.total_checks, 1);
    }

    #[tokio::test]
    async fn test_stats_readable_while_running() {
        let (probe, _) = FakeProbe::new("http://a", true, Duration::from_millis(1));
        let aggregator = Aggregator::new(vec![probe], ConsoleReporter::new(), options(2)).unwrap();

        aggregator.start(Signal::never()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let first = aggregator.get_stats();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = aggregator.get_stats();

        assert!(first.total_checks > 0);
        assert!(second.total_checks >= first.total_checks);
        assert_eq!(second.total_checks, second.success_count + second.failure_count);

        aggregator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_outcomes_are_not_reported() {
        let probe: Arc<dyn Probe> = Arc::new(HangingProbe {
            url: "http://hanging".to_string(),
        });
        let aggregator = Aggregator::new(vec![probe], ConsoleReporter::new(), options(3)).unwrap();
        let (cancel_trigger, cancel) = Signal::new();

        aggregator.start(cancel).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_trigger.fire();

        let stats = tokio::time::timeout(Duration::from_secs(1), aggregator.stop())
            .await
            .expect("取消后停止不应阻塞")
            .unwrap();

        assert_eq!(stats.total_checks, 0);
        assert_eq!(stats.failure_count, 0);
    }
}
