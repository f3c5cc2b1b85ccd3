//! 控制器配置

use crate::error::ControlError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 控制器配置
///
/// 所有字段都有默认值，配置文件中的 `[controller]` 段可以只写需要覆盖的项。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// 控制周期（毫秒）
    pub period_ms: u64,
    /// 无反馈时的重试间隔（毫秒）
    pub feedback_backoff_ms: u64,
    /// 初始运动扭矩（Nm）
    pub move_torque: f64,
    /// 运动扭矩下限（Nm）
    pub torque_min: f64,
    /// 运动扭矩上限（Nm）
    pub torque_max: f64,
    /// 手动模式位置增益（Nm/rad）
    pub manual_kp: f64,
    /// 手动模式速度增益（Nm/(rad/s)）
    pub manual_kd: f64,
    /// 扭矩模式阻尼（Nm/(rad/s)）
    pub torque_kd: f64,
    /// 未校准时目标位置的下限（rad）
    pub fallback_min: f64,
    /// 未校准时目标位置的上限（rad）
    pub fallback_max: f64,
    /// 断开时等待控制线程退出的上限（毫秒）
    pub teardown_timeout_ms: u64,
    /// 零扭矩指令与失能之间的等待（毫秒）
    pub zero_command_settle_ms: u64,
    /// 运动中反馈中断超过该时长则强制停止（毫秒，不设置则不检查）
    pub stale_feedback_timeout_ms: Option<u64>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            feedback_backoff_ms: 20,
            move_torque: 0.8,
            torque_min: 0.1,
            torque_max: 2.0,
            manual_kp: 5.0,
            manual_kd: 1.0,
            torque_kd: 1.0,
            fallback_min: -100.0,
            fallback_max: 100.0,
            teardown_timeout_ms: 2000,
            zero_command_settle_ms: 50,
            stale_feedback_timeout_ms: None,
        }
    }
}

impl ControllerConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.period_ms == 0 {
            return Err(ControlError::Config("period_ms must be positive".into()));
        }
        if self.feedback_backoff_ms == 0 {
            return Err(ControlError::Config(
                "feedback_backoff_ms must be positive".into(),
            ));
        }
        if self.teardown_timeout_ms == 0 {
            return Err(ControlError::Config(
                "teardown_timeout_ms must be positive".into(),
            ));
        }
        if self.stale_feedback_timeout_ms == Some(0) {
            return Err(ControlError::Config(
                "stale_feedback_timeout_ms must be positive when set".into(),
            ));
        }

        let finite = [
            ("move_torque", self.move_torque),
            ("torque_min", self.torque_min),
            ("torque_max", self.torque_max),
            ("manual_kp", self.manual_kp),
            ("manual_kd", self.manual_kd),
            ("torque_kd", self.torque_kd),
            ("fallback_min", self.fallback_min),
            ("fallback_max", self.fallback_max),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ControlError::Config(format!("{} must be finite", name)));
        }

        if self.torque_min <= 0.0 || self.torque_min > self.torque_max {
            return Err(ControlError::Config(format!(
                "torque range [{}, {}] is invalid",
                self.torque_min, self.torque_max
            )));
        }
        if self.fallback_min > self.fallback_max {
            return Err(ControlError::Config(format!(
                "fallback range [{}, {}] is invalid",
                self.fallback_min, self.fallback_max
            )));
        }
        if self.manual_kp < 0.0 || self.manual_kd < 0.0 || self.torque_kd < 0.0 {
            return Err(ControlError::Config("gains must be non-negative".into()));
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn feedback_backoff(&self) -> Duration {
        Duration::from_millis(self.feedback_backoff_ms)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    pub fn zero_command_settle(&self) -> Duration {
        Duration::from_millis(self.zero_command_settle_ms)
    }

    pub fn stale_feedback_timeout(&self) -> Option<Duration> {
        self.stale_feedback_timeout_ms.map(Duration::from_millis)
    }

    /// 将扭矩限制到 `[torque_min, torque_max]`
    pub fn clamp_torque(&self, value: f64) -> f64 {
        value.clamp(self.torque_min, self.torque_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.period(), Duration::from_millis(20));
        assert_eq!(config.teardown_timeout(), Duration::from_secs(2));
        assert_eq!(config.stale_feedback_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_inverted_ranges() {
        let config = ControllerConfig {
            torque_min: 2.0,
            torque_max: 0.1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ControlError::Config(_))));

        let config = ControllerConfig {
            fallback_min: 1.0,
            fallback_max: -1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ControlError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_period_and_nan() {
        let config = ControllerConfig {
            period_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ControllerConfig {
            manual_kp: f64::NAN,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("manual_kp"));

        let config = ControllerConfig {
            stale_feedback_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"period_ms": 10, "torque_max": 1.5}"#).unwrap();
        assert_eq!(config.period_ms, 10);
        assert_eq!(config.torque_max, 1.5);
        assert_eq!(config.torque_min, 0.1);
        assert_eq!(config.fallback_min, -100.0);
    }

    #[test]
    fn test_clamp_torque() {
        let config = ControllerConfig::default();
        assert_eq!(config.clamp_torque(0.0), 0.1);
        assert_eq!(config.clamp_torque(1.2), 1.2);
        assert_eq!(config.clamp_torque(f64::INFINITY), 2.0);
    }
}
