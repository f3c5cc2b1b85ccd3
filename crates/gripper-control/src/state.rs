//! 共享运动状态
//!
//! [`MotionState`] 是控制线程与指令接口之间唯一共享的可变记录，
//! 由单个 `parking_lot::Mutex` 保护。任何需要内部一致性的多字段读取
//! 都在同一个临界区内完成；锁内不做任何 IO。

use crate::config::ControllerConfig;
use crate::metrics::LoopMetrics;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;

/// 运动模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionMode {
    /// 零扭矩
    #[default]
    Stopped,
    /// 负向恒扭矩，到达 `min_angle` 自动停止
    Grasping,
    /// 正向恒扭矩，到达 `max_angle` 自动停止
    Releasing,
    /// 在两个边界之间往复
    Reciprocating,
    /// 位置保持（朝 `target_position`）
    Manual,
}

impl MotionMode {
    pub const ALL: [MotionMode; 5] = [
        MotionMode::Stopped,
        MotionMode::Grasping,
        MotionMode::Releasing,
        MotionMode::Reciprocating,
        MotionMode::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MotionMode::Stopped => "stopped",
            MotionMode::Grasping => "grasping",
            MotionMode::Releasing => "releasing",
            MotionMode::Reciprocating => "reciprocating",
            MotionMode::Manual => "manual",
        }
    }

    /// 是否为恒扭矩大行程运动
    pub fn is_torque_motion(self) -> bool {
        matches!(
            self,
            MotionMode::Grasping | MotionMode::Releasing | MotionMode::Reciprocating
        )
    }
}

impl fmt::Display for MotionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 可由外部请求的运动
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionRequest {
    Grasp,
    Release,
    Reciprocate,
    Stop,
}

impl MotionRequest {
    pub fn target_mode(self) -> MotionMode {
        match self {
            MotionRequest::Grasp => MotionMode::Grasping,
            MotionRequest::Release => MotionMode::Releasing,
            MotionRequest::Reciprocate => MotionMode::Reciprocating,
            MotionRequest::Stop => MotionMode::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MotionRequest::Grasp => "grasp",
            MotionRequest::Release => "release",
            MotionRequest::Reciprocate => "reciprocate",
            MotionRequest::Stop => "stop",
        }
    }
}

/// 共享运动状态（仅在 [`Shared::state`] 锁内访问）
#[derive(Debug, Clone)]
pub(crate) struct MotionState {
    pub mode: MotionMode,
    pub position: f64,
    pub torque: f64,
    pub target_position: f64,
    pub min_angle: Option<f64>,
    pub max_angle: Option<f64>,
    pub is_calibrated: bool,
    pub move_torque: f64,
    pub is_connected: bool,
}

impl MotionState {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            mode: MotionMode::Stopped,
            position: 0.0,
            torque: 0.0,
            target_position: 0.0,
            min_angle: None,
            max_angle: None,
            is_calibrated: false,
            move_torque: config.clamp_torque(config.move_torque),
            is_connected: false,
        }
    }

    pub fn snapshot(&self) -> MotionSnapshot {
        MotionSnapshot {
            is_connected: self.is_connected,
            mode: self.mode,
            position: self.position,
            torque: self.torque,
            min_angle: self.min_angle,
            max_angle: self.max_angle,
            target_position: self.target_position,
            move_torque: self.move_torque,
            is_calibrated: self.is_calibrated,
        }
    }
}

/// 对外可见的状态快照（不含往复方向）
///
/// 序列化后即遥测信封中的 `data` 字段。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotionSnapshot {
    pub is_connected: bool,
    pub mode: MotionMode,
    pub position: f64,
    pub torque: f64,
    pub min_angle: Option<f64>,
    pub max_angle: Option<f64>,
    pub target_position: f64,
    pub move_torque: f64,
    pub is_calibrated: bool,
}

/// 控制线程与指令接口共享的上下文
#[derive(Debug)]
pub(crate) struct Shared {
    pub state: Mutex<MotionState>,
    pub config: ControllerConfig,
    pub metrics: LoopMetrics,
}

impl Shared {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            state: Mutex::new(MotionState::new(&config)),
            config,
            metrics: LoopMetrics::new(),
        }
    }

    /// 仅当模式仍为 `expected` 时切换到 `Stopped`
    ///
    /// 控制线程在锁外做出的停止决定不得覆盖期间到达的新指令。
    /// 返回是否实际发生了切换。
    pub fn stop_if(&self, expected: MotionMode) -> bool {
        let mut state = self.state.lock();
        if state.mode == expected {
            state.mode = MotionMode::Stopped;
            true
        } else {
            false
        }
    }

    /// 丢弃本次连接的状态（断开时调用）
    pub fn reset(&self) {
        *self.state.lock() = MotionState::new(&self.config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let shared = Shared::new(ControllerConfig::default());
        let snap = shared.state.lock().snapshot();
        assert_eq!(snap.mode, MotionMode::Stopped);
        assert!(!snap.is_calibrated);
        assert!(!snap.is_connected);
        assert_eq!(snap.min_angle, None);
        assert_eq!(snap.max_angle, None);
        assert_eq!(snap.move_torque, 0.8);
    }

    #[test]
    fn test_initial_move_torque_clamped() {
        let config = ControllerConfig {
            move_torque: 5.0,
            ..Default::default()
        };
        let state = MotionState::new(&config);
        assert_eq!(state.move_torque, 2.0);
    }

    #[test]
    fn test_stop_if_only_matching_mode() {
        let shared = Shared::new(ControllerConfig::default());
        shared.state.lock().mode = MotionMode::Manual;

        assert!(!shared.stop_if(MotionMode::Grasping));
        assert_eq!(shared.state.lock().mode, MotionMode::Manual);

        assert!(shared.stop_if(MotionMode::Manual));
        assert_eq!(shared.state.lock().mode, MotionMode::Stopped);
    }

    #[test]
    fn test_reset_discards_calibration() {
        let shared = Shared::new(ControllerConfig::default());
        {
            let mut state = shared.state.lock();
            state.min_angle = Some(-3.78);
            state.max_angle = Some(-3.05);
            state.is_calibrated = true;
            state.mode = MotionMode::Reciprocating;
            state.is_connected = true;
        }
        shared.reset();
        let snap = shared.state.lock().snapshot();
        assert!(!snap.is_calibrated);
        assert!(!snap.is_connected);
        assert_eq!(snap.mode, MotionMode::Stopped);
        assert_eq!(snap.min_angle, None);
    }

    #[test]
    fn test_mode_names() {
        let names: Vec<&str> = MotionMode::ALL.iter().map(|m| m.as_str()).collect();
        assert_eq!(
            names,
            ["stopped", "grasping", "releasing", "reciprocating", "manual"]
        );
        assert_eq!(MotionRequest::Grasp.target_mode(), MotionMode::Grasping);
        assert_eq!(MotionRequest::Stop.target_mode(), MotionMode::Stopped);
        assert!(MotionMode::Reciprocating.is_torque_motion());
        assert!(!MotionMode::Manual.is_torque_motion());
    }

    #[test]
    fn test_snapshot_serializes_lowercase_and_null_bounds() {
        let state = MotionState::new(&ControllerConfig::default());
        let value = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(value["mode"], "stopped");
        assert!(value["min_angle"].is_null());
        assert!(value["max_angle"].is_null());
        assert_eq!(value["is_calibrated"], false);
        assert_eq!(value["move_torque"], 0.8);
    }
}
