//! 健康检测模块
//!
//! 提供HTTP探测、结果聚合与报告功能

pub mod aggregator;
pub mod probe;
pub mod reporter;
pub mod result;
pub mod signal;

// 重新导出主要类型
pub use aggregator::{Aggregator, AggregatorOptions, AggregatorState};
pub use probe::{build_probes, HttpProbe, Probe};
pub use reporter::{
    ConsoleReporter, HealthReporter, StatsHandle, TransitionCallback, TransitionEvent,
    TransitionKind,
};
pub use result::{AggregateStats, Outcome};
pub use signal::{Signal, SignalTrigger, StopCause, StopSignals};
