//! 夹爪指令

use crate::error::ControlError;
use crate::state::{MotionMode, MotionRequest};
use serde::Serialize;

/// 一条已解析的夹爪指令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GripperCommand {
    Motion(MotionRequest),
    /// 进入手动模式并设置目标位置（rad）
    SetPosition(f64),
    /// 设置运动扭矩（Nm）
    SetTorque(f64),
    /// 以当前位置作为 `min_angle`
    SetMin,
    /// 以当前位置作为 `max_angle`
    SetMax,
    ConfirmCalibration,
}

impl GripperCommand {
    /// 指令名（与信封中的 `command` 字段一致）
    pub fn name(&self) -> &'static str {
        match self {
            GripperCommand::Motion(request) => request.as_str(),
            GripperCommand::SetPosition(_) => "set_position",
            GripperCommand::SetTorque(_) => "set_torque",
            GripperCommand::SetMin => "set_min",
            GripperCommand::SetMax => "set_max",
            GripperCommand::ConfirmCalibration => "confirm_calibration",
        }
    }

    /// 由指令名和可选数值构造
    ///
    /// `value` 只对 `set_position` / `set_torque` 有意义，其他指令忽略它。
    pub fn parse(command: &str, value: Option<f64>) -> Result<Self, ControlError> {
        let cmd = match command {
            "grasp" => GripperCommand::Motion(MotionRequest::Grasp),
            "release" => GripperCommand::Motion(MotionRequest::Release),
            "reciprocate" => GripperCommand::Motion(MotionRequest::Reciprocate),
            "stop" => GripperCommand::Motion(MotionRequest::Stop),
            "set_position" => GripperCommand::SetPosition(value.ok_or(
                ControlError::MissingValue {
                    command: "set_position",
                },
            )?),
            "set_torque" => GripperCommand::SetTorque(value.ok_or(
                ControlError::MissingValue {
                    command: "set_torque",
                },
            )?),
            "set_min" => GripperCommand::SetMin,
            "set_max" => GripperCommand::SetMax,
            "confirm_calibration" => GripperCommand::ConfirmCalibration,
            other => return Err(ControlError::UnknownCommand(other.to_string())),
        };
        Ok(cmd)
    }
}

/// 校准边界
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    MinAngle,
    MaxAngle,
}

impl Bound {
    /// 采集该边界的指令名
    pub fn command_name(&self) -> &'static str {
        match self {
            Bound::MinAngle => "set_min",
            Bound::MaxAngle => "set_max",
        }
    }
}

/// 指令执行结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    Mode {
        mode: MotionMode,
    },
    Target {
        mode: MotionMode,
        target_position: f64,
    },
    MoveTorque {
        move_torque: f64,
    },
    BoundCaptured {
        bound: Bound,
        value: f64,
    },
    Calibrated {
        min_angle: f64,
        max_angle: f64,
    },
}
