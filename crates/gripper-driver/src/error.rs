//! 驱动层错误类型定义

use crate::command::ControlMode;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 底层 IO 错误（串口读写等）
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 传输打开失败
    #[error("Failed to open transport: {0}")]
    Open(String),

    /// 电机拒绝切换控制模式
    #[error("Actuator rejected control mode {0:?}")]
    ControlModeRejected(ControlMode),

    /// 电机拒绝使能
    #[error("Actuator rejected enable")]
    EnableRejected,

    /// 传输未打开
    #[error("Transport not open")]
    NotOpen,

    #[error("Device error: {0}")]
    Device(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let msg = format!("{}", DriverError::Open("/dev/ttyACM0: busy".to_string()));
        assert!(msg.contains("open transport") && msg.contains("/dev/ttyACM0"));

        let msg = format!("{}", DriverError::ControlModeRejected(ControlMode::Mit));
        assert_eq!(msg, "Actuator rejected control mode Mit");

        assert_eq!(format!("{}", DriverError::NotOpen), "Transport not open");
        assert_eq!(format!("{}", DriverError::EnableRejected), "Actuator rejected enable");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: DriverError = io.into();
        match err {
            DriverError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
            _ => panic!("Expected Io variant"),
        }
    }
}
