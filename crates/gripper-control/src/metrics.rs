//! 控制循环指标
//!
//! 原子计数器，控制线程写入，任意线程读取快照，不引入锁竞争。

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// 控制循环实时指标
#[derive(Debug, Default)]
pub struct LoopMetrics {
    /// 拿到反馈并计算了指令的周期数
    pub ticks: AtomicU64,

    /// 没有新反馈样本的次数
    pub feedback_gaps: AtomicU64,

    /// 成功发送的指令数
    pub commands_sent: AtomicU64,

    /// 发送失败次数
    pub send_failures: AtomicU64,

    /// 周期超时（耗时超过控制周期）次数
    ///
    /// 持续增长说明总线 IO 阻塞或系统负载过高。
    pub overruns: AtomicU64,

    /// 控制线程检测到非法模式并强制停止的次数
    pub gate_violations: AtomicU64,

    /// 到达边界自动停止的次数
    pub auto_stops: AtomicU64,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取指标快照
    ///
    /// 各计数器分别原子读取，之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            feedback_gaps: self.feedback_gaps.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            gate_violations: self.gate_violations.load(Ordering::Relaxed),
            auto_stops: self.auto_stops.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub feedback_gaps: u64,
    pub commands_sent: u64,
    pub send_failures: u64,
    pub overruns: u64,
    pub gate_violations: u64,
    pub auto_stops: u64,
}

impl MetricsSnapshot {
    /// 发送成功率（百分比）
    ///
    /// 尚未发送任何指令时返回 100.0。
    pub fn send_success_rate(&self) -> f64 {
        let attempts = self.commands_sent + self.send_failures;
        if attempts == 0 {
            100.0
        } else {
            (self.commands_sent as f64 / attempts as f64) * 100.0
        }
    }
}
