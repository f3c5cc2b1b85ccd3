//! 指令与反馈类型

/// 电机控制模式
///
/// 与电机固件寄存器中的模式编号一一对应。控制核心只使用 MIT 模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ControlMode {
    /// MIT 混合控制（位置 + 速度 + 前馈扭矩）
    #[default]
    Mit = 1,
}

/// 单次反馈样本
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feedback {
    /// 位置（rad）
    pub position: f64,
    /// 扭矩（Nm）
    pub torque: f64,
}

impl Feedback {
    pub const fn new(position: f64, torque: f64) -> Self {
        Self { position, torque }
    }
}

/// MIT 控制指令
///
/// 电机端输出扭矩：`tau_out = kp * (q - pos) + kd * (dq - vel) + tau`
///
/// - 纯扭矩控制：`kp = 0`，`q = dq = 0`，只给 `tau`（`kd` 作为阻尼项）
/// - 位置保持：`kp > 0`，`q` 为目标位置，`tau = 0`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MitCommand {
    /// 位置增益（Nm/rad）
    pub kp: f64,
    /// 速度增益（Nm/(rad/s)）
    pub kd: f64,
    /// 目标位置（rad）
    pub q: f64,
    /// 目标速度（rad/s）
    pub dq: f64,
    /// 前馈扭矩（Nm）
    pub tau: f64,
}

impl MitCommand {
    /// 纯扭矩指令
    pub const fn torque(tau: f64, kd: f64) -> Self {
        Self {
            kp: 0.0,
            kd,
            q: 0.0,
            dq: 0.0,
            tau,
        }
    }

    /// 位置保持指令（零前馈扭矩）
    pub const fn hold(q: f64, kp: f64, kd: f64) -> Self {
        Self {
            kp,
            kd,
            q,
            dq: 0.0,
            tau: 0.0,
        }
    }

    /// 零扭矩指令（关停前发送）
    pub const fn zero(kd: f64) -> Self {
        Self::torque(0.0, kd)
    }

    /// 该指令在静止电机上是否不产生主动扭矩
    pub fn is_zero_torque(&self) -> bool {
        self.kp == 0.0 && self.tau == 0.0
    }
}
