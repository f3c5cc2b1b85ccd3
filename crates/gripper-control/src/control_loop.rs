//! 固定周期控制循环
//!
//! 每个周期：
//! 1. 读取反馈（没有新样本或样本非有限值时短暂退避后重试，不修改状态、不发送指令）
//! 2. 锁内写入位置/扭矩并复制一份状态快照
//! 3. 校准门控（非法模式强制回到 `Stopped`）
//! 4. 按模式计算指令（边界到达时自动停止）
//! 5. 锁外发送指令
//! 6. 睡眠 `max(0, T - elapsed)`，不做追赶补偿

use crate::gate;
use crate::metrics::LoopMetrics;
use crate::state::{MotionMode, Shared};
use crate::surface::CommandSurface;
use gripper_driver::{ActuatorDriver, MitCommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// 单个周期的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// 没有新的反馈样本，本周期未发送指令
    NoFeedback,
    /// 指令已发送（`mode` 为本周期实际生效的模式）
    Sent { mode: MotionMode, command: MitCommand },
    /// 指令发送失败
    SendFailed { mode: MotionMode, command: MitCommand },
}

impl TickOutcome {
    pub fn command(&self) -> Option<MitCommand> {
        match self {
            TickOutcome::NoFeedback => None,
            TickOutcome::Sent { command, .. } | TickOutcome::SendFailed { command, .. } => {
                Some(*command)
            },
        }
    }
}

/// 一个周期开始时复制出的状态
#[derive(Debug, Clone, Copy)]
struct TickSnapshot {
    mode: MotionMode,
    target_position: f64,
    move_torque: f64,
    min_angle: Option<f64>,
    max_angle: Option<f64>,
    is_calibrated: bool,
}

/// 控制循环
///
/// 由 [`GripperController`](crate::GripperController) 在控制线程中运行；
/// 也可以直接调用 [`ControlLoop::tick`] 逐周期驱动（测试使用）。
pub struct ControlLoop {
    shared: Arc<Shared>,
    /// 往复方向（+1 / -1），仅本线程读写
    direction: f64,
    last_feedback: Instant,
    stale_reported: bool,
}

impl ControlLoop {
    pub fn new(surface: &CommandSurface) -> Self {
        Self {
            shared: Arc::clone(surface.shared()),
            direction: 1.0,
            last_feedback: Instant::now(),
            stale_reported: false,
        }
    }

    fn metrics(&self) -> &LoopMetrics {
        &self.shared.metrics
    }

    /// 执行一个控制周期（不含睡眠）
    pub fn tick<D: ActuatorDriver + ?Sized>(&mut self, driver: &mut D) -> TickOutcome {
        let feedback = match driver.read_feedback() {
            Some(fb) if fb.position.is_finite() && fb.torque.is_finite() => fb,
            Some(fb) => {
                LoopMetrics::incr(&self.metrics().feedback_gaps);
                warn!(
                    "Discarding non-finite feedback (position {}, torque {})",
                    fb.position, fb.torque
                );
                self.check_stale_feedback();
                return TickOutcome::NoFeedback;
            },
            None => {
                LoopMetrics::incr(&self.metrics().feedback_gaps);
                trace!("No feedback sample, skipping tick");
                self.check_stale_feedback();
                return TickOutcome::NoFeedback;
            },
        };
        self.last_feedback = Instant::now();
        self.stale_reported = false;
        LoopMetrics::incr(&self.metrics().ticks);

        let snap = {
            let mut state = self.shared.state.lock();
            state.position = feedback.position;
            state.torque = feedback.torque;
            TickSnapshot {
                mode: state.mode,
                target_position: state.target_position,
                move_torque: state.move_torque,
                min_angle: state.min_angle,
                max_angle: state.max_angle,
                is_calibrated: state.is_calibrated,
            }
        };

        let mut mode = snap.mode;
        if !gate::allow(mode, snap.is_calibrated) {
            LoopMetrics::incr(&self.metrics().gate_violations);
            self.shared.stop_if(mode);
            warn!("Mode '{}' active without calibration, forcing stop", mode);
            mode = MotionMode::Stopped;
        }

        let (mode, command) = self.evaluate(mode, &snap, feedback.position);

        match driver.send_command(command) {
            Ok(()) => {
                LoopMetrics::incr(&self.metrics().commands_sent);
                TickOutcome::Sent { mode, command }
            },
            Err(e) => {
                LoopMetrics::incr(&self.metrics().send_failures);
                warn!("Failed to send command: {}", e);
                TickOutcome::SendFailed { mode, command }
            },
        }
    }

    /// 计算本周期指令，返回 (生效模式, 指令)
    fn evaluate(
        &mut self,
        mode: MotionMode,
        snap: &TickSnapshot,
        position: f64,
    ) -> (MotionMode, MitCommand) {
        let config = &self.shared.config;
        let kd = config.torque_kd;

        match mode {
            MotionMode::Manual => (
                mode,
                MitCommand::hold(snap.target_position, config.manual_kp, config.manual_kd),
            ),
            MotionMode::Grasping => match snap.min_angle {
                Some(min) if position <= min => self.auto_stop(mode, position, min),
                _ => (mode, MitCommand::torque(-snap.move_torque, kd)),
            },
            MotionMode::Releasing => match snap.max_angle {
                Some(max) if position >= max => self.auto_stop(mode, position, max),
                _ => (mode, MitCommand::torque(snap.move_torque, kd)),
            },
            MotionMode::Reciprocating => {
                if let Some(max) = snap.max_angle
                    && position >= max
                {
                    self.direction = -1.0;
                } else if let Some(min) = snap.min_angle
                    && position <= min
                {
                    self.direction = 1.0;
                }
                (
                    mode,
                    MitCommand::torque(self.direction * snap.move_torque, kd),
                )
            },
            MotionMode::Stopped => (mode, MitCommand::zero(kd)),
        }
    }

    /// 边界到达：请求停止，本周期即发送零扭矩
    fn auto_stop(&self, mode: MotionMode, position: f64, bound: f64) -> (MotionMode, MitCommand) {
        if self.shared.stop_if(mode) {
            LoopMetrics::incr(&self.metrics().auto_stops);
            info!(
                "{} reached boundary ({:.4} vs {:.4}), stopping",
                mode, position, bound
            );
        }
        (MotionMode::Stopped, MitCommand::zero(self.shared.config.torque_kd))
    }

    fn check_stale_feedback(&mut self) {
        let Some(limit) = self.shared.config.stale_feedback_timeout() else {
            return;
        };
        if self.stale_reported || self.last_feedback.elapsed() < limit {
            return;
        }

        let interrupted = {
            let mut state = self.shared.state.lock();
            let mode = state.mode;
            if mode == MotionMode::Stopped {
                return;
            }
            state.mode = MotionMode::Stopped;
            mode
        };
        self.stale_reported = true;
        error!(
            "No feedback for {:?} (mode was '{}'), forcing stop",
            limit, interrupted
        );
    }

    /// 运行控制循环，直到 `is_running` 被清除
    ///
    /// 退出时返回驱动所有权，由调用方执行安全关停序列。
    pub fn run<D: ActuatorDriver>(mut self, mut driver: D, is_running: Arc<AtomicBool>) -> D {
        #[cfg(feature = "realtime")]
        {
            use thread_priority::*;

            match set_current_thread_priority(ThreadPriority::Max) {
                Ok(_) => {
                    info!("Control thread priority set to MAX (realtime)");
                },
                Err(e) => {
                    warn!(
                        "Failed to set control thread priority: {:?}. \
                        On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                        e
                    );
                },
            }
        }

        let period = self.shared.config.period();
        let backoff = self.shared.config.feedback_backoff();
        info!("Control loop started (period {:?})", period);
        self.last_feedback = Instant::now();

        // Acquire: 看到 false 时必须能看到发起方在此之前的全部写入
        while is_running.load(Ordering::Acquire) {
            let tick_start = Instant::now();

            if let TickOutcome::NoFeedback = self.tick(&mut driver) {
                spin_sleep::sleep(backoff);
                continue;
            }

            let elapsed = tick_start.elapsed();
            match period.checked_sub(elapsed) {
                Some(remaining) => spin_sleep::sleep(remaining),
                None => {
                    LoopMetrics::incr(&self.metrics().overruns);
                    debug!("Tick overran: {:?} > {:?}", elapsed, period);
                },
            }
        }

        let stats = self.metrics().snapshot();
        info!(
            "Control loop stopped ({} ticks, {} overruns, {:.1}% commands sent)",
            stats.ticks,
            stats.overruns,
            stats.send_success_rate()
        );
        driver
    }
}
