//! 校准门控
//!
//! 未校准时行程边界未知，只允许 `Stopped` 与 `Manual`。

use crate::state::MotionMode;

/// 给定校准状态，判断模式是否合法
pub fn allow(mode: MotionMode, is_calibrated: bool) -> bool {
    is_calibrated || matches!(mode, MotionMode::Stopped | MotionMode::Manual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_uncalibrated_allows_only_stop_and_manual() {
        assert!(allow(MotionMode::Stopped, false));
        assert!(allow(MotionMode::Manual, false));
        assert!(!allow(MotionMode::Grasping, false));
        assert!(!allow(MotionMode::Releasing, false));
        assert!(!allow(MotionMode::Reciprocating, false));
    }

    fn any_mode() -> impl Strategy<Value = MotionMode> {
        prop::sample::select(MotionMode::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn calibrated_allows_every_mode(mode in any_mode()) {
            prop_assert!(allow(mode, true));
        }

        #[test]
        fn uncalibrated_rejects_torque_motions(mode in any_mode()) {
            prop_assert_eq!(allow(mode, false), !mode.is_torque_motion());
        }
    }
}
