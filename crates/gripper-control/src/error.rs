//! 控制层错误类型定义

use crate::state::MotionMode;
use gripper_driver::DriverError;
use std::time::Duration;
use thiserror::Error;

/// 控制层错误类型
#[derive(Error, Debug)]
pub enum ControlError {
    /// 驱动层错误（连接/关停阶段）
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 驱动实例已随未退出的控制线程丢失
    #[error("Driver is unavailable (lost with a control loop that did not exit)")]
    DriverUnavailable,

    #[error("Controller is not connected")]
    NotConnected,

    /// 未校准时请求了大行程运动
    #[error("Mode '{mode}' requires calibration")]
    NotCalibrated { mode: MotionMode },

    /// 确认校准时缺少边界
    #[error("Calibration incomplete: {missing} not captured")]
    CalibrationIncomplete { missing: &'static str },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Command '{command}' requires a numeric value")]
    MissingValue { command: &'static str },

    #[error("Invalid value for '{command}': {value}")]
    InvalidValue { command: &'static str, value: String },

    /// 指令信封无法解析
    #[error("Malformed command envelope: {0}")]
    MalformedEnvelope(String),

    /// 控制线程未在时限内退出，安全关停已转入后台
    #[error("Control loop did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Control loop thread panicked")]
    LoopPanicked,

    #[error("Failed to spawn control thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ControlError {
    /// 是否属于调用方输入错误（格式错误/未知指令/非法数值）
    ///
    /// 传输层据此区分 400 与 409。
    pub fn is_malformed_request(&self) -> bool {
        matches!(
            self,
            ControlError::UnknownCommand(_)
                | ControlError::MissingValue { .. }
                | ControlError::InvalidValue { .. }
                | ControlError::MalformedEnvelope(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_error_display() {
        let err = ControlError::NotCalibrated {
            mode: MotionMode::Grasping,
        };
        assert_eq!(format!("{}", err), "Mode 'grasping' requires calibration");

        let err = ControlError::CalibrationIncomplete {
            missing: "max_angle",
        };
        assert_eq!(
            format!("{}", err),
            "Calibration incomplete: max_angle not captured"
        );

        let err = ControlError::ShutdownTimeout(Duration::from_secs(2));
        assert!(format!("{}", err).contains("2s"));
    }

    #[test]
    fn test_from_driver_error() {
        let err: ControlError = DriverError::EnableRejected.into();
        match err {
            ControlError::Driver(DriverError::EnableRejected) => {},
            _ => panic!("Expected Driver variant"),
        }
    }

    #[test]
    fn test_malformed_request_classification() {
        assert!(ControlError::UnknownCommand("fly".into()).is_malformed_request());
        assert!(ControlError::MissingValue { command: "set_torque" }.is_malformed_request());
        assert!(ControlError::MalformedEnvelope("eof".into()).is_malformed_request());
        assert!(
            !ControlError::NotCalibrated {
                mode: MotionMode::Releasing
            }
            .is_malformed_request()
        );
        assert!(!ControlError::NotConnected.is_malformed_request());
    }
}
