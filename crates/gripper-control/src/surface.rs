//! 指令接口
//!
//! [`CommandSurface`] 是可克隆的句柄，注入到每个传输层任务中。
//! 每个操作在一个临界区内完成全部读写，日志在释放锁之后输出。

use crate::command::{Bound, CommandOutcome, GripperCommand};
use crate::config::ControllerConfig;
use crate::error::ControlError;
use crate::gate;
use crate::metrics::MetricsSnapshot;
use crate::state::{MotionMode, MotionRequest, MotionSnapshot, Shared};
use std::sync::Arc;
use tracing::{info, warn};

enum ConfirmRejected {
    Missing(&'static str),
    NonFinite(f64, f64),
}

/// 线程安全的夹爪指令接口
#[derive(Debug, Clone)]
pub struct CommandSurface {
    shared: Arc<Shared>,
}

impl CommandSurface {
    /// 创建一个未连接的指令接口
    ///
    /// 配置未通过 [`ControllerConfig::validate`] 时返回 `Config` 错误。
    pub fn new(config: ControllerConfig) -> Result<Self, ControlError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(config)),
        })
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// 请求运动模式
    ///
    /// 未校准时 grasp/release/reciprocate 被拒绝，状态不变。
    pub fn request_mode(&self, request: MotionRequest) -> Result<MotionMode, ControlError> {
        let mode = request.target_mode();
        let accepted = {
            let mut state = self.shared.state.lock();
            if gate::allow(mode, state.is_calibrated) {
                state.mode = mode;
                true
            } else {
                false
            }
        };

        if accepted {
            info!("Mode -> {}", mode);
            Ok(mode)
        } else {
            warn!("Rejected '{}': gripper is not calibrated", request.as_str());
            Err(ControlError::NotCalibrated { mode })
        }
    }

    /// 进入手动模式并设置目标位置
    ///
    /// 已校准时限制在 `[min_angle, max_angle]`，否则限制在宽松的后备范围内，
    /// 方便操作者点动寻找物理极限。返回实际生效的目标位置。
    pub fn request_position(&self, value: f64) -> Result<f64, ControlError> {
        if value.is_nan() {
            warn!("Rejected set_position: NaN");
            return Err(ControlError::InvalidValue {
                command: "set_position",
                value: value.to_string(),
            });
        }

        let config = &self.shared.config;
        let target = {
            let mut state = self.shared.state.lock();
            let (lo, hi) = match (state.is_calibrated, state.min_angle, state.max_angle) {
                (true, Some(lo), Some(hi)) => (lo, hi),
                _ => (config.fallback_min, config.fallback_max),
            };
            let target = value.clamp(lo, hi);
            state.mode = MotionMode::Manual;
            state.target_position = target;
            target
        };

        info!("Manual target -> {:.4} (requested {:.4})", target, value);
        Ok(target)
    }

    /// 设置运动扭矩，限制在 `[torque_min, torque_max]`
    pub fn request_torque_limit(&self, value: f64) -> Result<f64, ControlError> {
        if value.is_nan() {
            warn!("Rejected set_torque: NaN");
            return Err(ControlError::InvalidValue {
                command: "set_torque",
                value: value.to_string(),
            });
        }

        let torque = self.shared.config.clamp_torque(value);
        self.shared.state.lock().move_torque = torque;

        info!("Move torque -> {:.3}", torque);
        Ok(torque)
    }

    /// 记录当前位置为 `min_angle`
    pub fn calibrate_set_min(&self) -> Result<f64, ControlError> {
        self.capture_bound(Bound::MinAngle)
    }

    /// 记录当前位置为 `max_angle`
    pub fn calibrate_set_max(&self) -> Result<f64, ControlError> {
        self.capture_bound(Bound::MaxAngle)
    }

    /// 采集当前位置作为边界
    ///
    /// 已校准后重新采集不会就地覆盖生效中的边界，而是撤销校准：
    /// 新边界在确认前不参与运动，正在进行的大行程运动随之停止。
    /// 非有限的位置（传感器故障）被拒绝，状态不变。
    fn capture_bound(&self, bound: Bound) -> Result<f64, ControlError> {
        let (position, recalibrating) = {
            let mut state = self.shared.state.lock();
            if !state.is_connected {
                drop(state);
                warn!("Rejected {:?} capture: not connected", bound);
                return Err(ControlError::NotConnected);
            }
            let position = state.position;
            if !position.is_finite() {
                drop(state);
                warn!("Rejected {:?} capture: position is {}", bound, position);
                return Err(ControlError::InvalidValue {
                    command: bound.command_name(),
                    value: position.to_string(),
                });
            }
            match bound {
                Bound::MinAngle => state.min_angle = Some(position),
                Bound::MaxAngle => state.max_angle = Some(position),
            }
            let recalibrating = state.is_calibrated;
            if recalibrating {
                state.is_calibrated = false;
                if state.mode.is_torque_motion() {
                    state.mode = MotionMode::Stopped;
                }
            }
            (position, recalibrating)
        };

        if recalibrating {
            warn!("Recalibrating: calibration cleared until confirmed again");
        }
        info!("Captured {:?} = {:.4}", bound, position);
        Ok(position)
    }

    /// 确认校准
    ///
    /// 两个边界都已采集时才生效；顺序颠倒时自动交换。成功后模式为 `Stopped`。
    pub fn calibrate_confirm(&self) -> Result<(f64, f64), ControlError> {
        let result = {
            let mut state = self.shared.state.lock();
            match (state.min_angle, state.max_angle) {
                (Some(a), Some(b)) if !(a.is_finite() && b.is_finite()) => {
                    Err(ConfirmRejected::NonFinite(a, b))
                },
                (Some(a), Some(b)) => {
                    let (lo, hi) = if a > b { (b, a) } else { (a, b) };
                    state.min_angle = Some(lo);
                    state.max_angle = Some(hi);
                    state.is_calibrated = true;
                    state.mode = MotionMode::Stopped;
                    Ok((lo, hi))
                },
                (None, Some(_)) => Err(ConfirmRejected::Missing("min_angle")),
                (Some(_), None) => Err(ConfirmRejected::Missing("max_angle")),
                (None, None) => Err(ConfirmRejected::Missing("min_angle and max_angle")),
            }
        };

        match result {
            Ok((lo, hi)) => {
                info!("Calibration confirmed: [{:.4}, {:.4}]", lo, hi);
                Ok((lo, hi))
            },
            Err(ConfirmRejected::Missing(missing)) => {
                warn!("Calibration confirm rejected: {} not captured", missing);
                Err(ControlError::CalibrationIncomplete { missing })
            },
            Err(ConfirmRejected::NonFinite(a, b)) => {
                warn!("Calibration confirm rejected: bounds [{}, {}]", a, b);
                Err(ControlError::InvalidValue {
                    command: "confirm_calibration",
                    value: format!("[{}, {}]", a, b),
                })
            },
        }
    }

    /// 对外可见状态的快照
    pub fn snapshot(&self) -> MotionSnapshot {
        self.shared.state.lock().snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// 执行一条已解析的指令
    pub fn execute(&self, command: GripperCommand) -> Result<CommandOutcome, ControlError> {
        match command {
            GripperCommand::Motion(request) => {
                self.request_mode(request).map(|mode| CommandOutcome::Mode { mode })
            },
            GripperCommand::SetPosition(value) => {
                self.request_position(value)
                    .map(|target_position| CommandOutcome::Target {
                        mode: MotionMode::Manual,
                        target_position,
                    })
            },
            GripperCommand::SetTorque(value) => self
                .request_torque_limit(value)
                .map(|move_torque| CommandOutcome::MoveTorque { move_torque }),
            GripperCommand::SetMin => self.calibrate_set_min().map(|value| {
                CommandOutcome::BoundCaptured {
                    bound: Bound::MinAngle,
                    value,
                }
            }),
            GripperCommand::SetMax => self.calibrate_set_max().map(|value| {
                CommandOutcome::BoundCaptured {
                    bound: Bound::MaxAngle,
                    value,
                }
            }),
            GripperCommand::ConfirmCalibration => {
                self.calibrate_confirm()
                    .map(|(min_angle, max_angle)| CommandOutcome::Calibrated {
                        min_angle,
                        max_angle,
                    })
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn set_feedback_for_test(&self, position: f64) {
        let mut state = self.shared.state.lock();
        state.is_connected = true;
        state.position = position;
    }
}
