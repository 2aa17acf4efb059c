//! 协作式停止信号
//!
//! 基于 `tokio::sync::watch` 的一次性信号：外部取消信号与聚合器内部停止信号
//! 使用同一实现，由工作协程在每个检查点轮询。

use tokio::sync::watch;

/// 信号触发端
#[derive(Debug)]
pub struct SignalTrigger {
    tx: watch::Sender<bool>,
}

impl SignalTrigger {
    /// 触发信号，返回本次调用是否为首次触发
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// 是否已触发
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }
}

/// 信号监听端，可克隆给任意数量的任务
#[derive(Debug, Clone)]
pub struct Signal {
    rx: watch::Receiver<bool>,
}

impl Signal {
    /// 创建一对触发端/监听端
    pub fn new() -> (SignalTrigger, Signal) {
        let (tx, rx) = watch::channel(false);
        (SignalTrigger { tx }, Signal { rx })
    }

    /// 永远不会触发的信号
    pub fn never() -> Signal {
        let (_tx, rx) = watch::channel(false);
        Signal { rx }
    }

    /// 非阻塞检查是否已触发
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// 等待信号触发；触发端被丢弃且从未触发时永远挂起
    pub async fn fired(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // 触发端已丢弃，值不会再变化
                if *self.rx.borrow() {
                    return;
                }
                std::future::pending::<()>().await;
            }
        }
    }
}

/// 工作循环终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// 外部取消信号
    Cancelled,
    /// 聚合器内部停止信号
    Stopped,
}

impl std::fmt::Display for StopCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopCause::Cancelled => write!(f, "cancelled"),
            StopCause::Stopped => write!(f, "stopped"),
        }
    }
}

/// 工作协程观察的两个独立信号
#[derive(Debug, Clone)]
pub struct StopSignals {
    /// 外部取消信号
    pub external: Signal,
    /// 内部停止信号
    pub internal: Signal,
}

impl StopSignals {
    /// 检查两个信号，外部取消优先
    pub fn check(&self) -> Option<StopCause> {
        if self.external.is_fired() {
            Some(StopCause::Cancelled)
        } else if self.internal.is_fired() {
            Some(StopCause::Stopped)
        } else {
            None
        }
    }

    /// 等待任一信号触发
    pub async fn wait(&mut self) -> StopCause {
        tokio::select! {
            _ = self.external.fired() => StopCause::Cancelled,
            _ = self.internal.fired() => StopCause::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fire_only_once() {
        let (trigger, signal) = Signal::new();
        assert!(!signal.is_fired());

        assert!(trigger.fire());
        assert!(!trigger.fire());
        assert!(signal.is_fired());
        assert!(trigger.is_fired());
    }

    #[tokio::test]
    async fn test_fired_wakes_waiter() {
        let (trigger, mut signal) = Signal::new();
        let waiter = tokio::spawn(async move {
            signal.fired().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.fire();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("等待信号超时")
            .unwrap();
    }

    #[test]
    fn test_fired_pending_until_trigger() {
        let (trigger, mut signal) = Signal::new();
        let mut fired = tokio_test::task::spawn(signal.fired());

        tokio_test::assert_pending!(fired.poll());

        trigger.fire();
        assert!(fired.is_woken());
        tokio_test::assert_ready!(fired.poll());
    }

    #[tokio::test]
    async fn test_never_signal_does_not_fire() {
        let mut signal = Signal::never();
        assert!(!signal.is_fired());

        let result = tokio::time::timeout(Duration::from_millis(20), signal.fired()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stop_signals_check_prefers_external() {
        let (external_trigger, external) = Signal::new();
        let (internal_trigger, internal) = Signal::new();
        let signals = StopSignals { external, internal };

        assert_eq!(signals.check(), None);

        internal_trigger.fire();
        assert_eq!(signals.check(), Some(StopCause::Stopped));

        external_trigger.fire();
        assert_eq!(signals.check(), Some(StopCause::Cancelled));
    }

    #[tokio::test]
    async fn test_stop_signals_wait() {
        let (_external_trigger, external) = Signal::new();
        let (internal_trigger, internal) = Signal::new();
        let mut signals = StopSignals { external, internal };

        internal_trigger.fire();
        assert_eq!(signals.wait().await, StopCause::Stopped);
    }
}
