//! # Gripper Control Core
//!
//! 单夹爪运动控制核心：
//! - [`CommandSurface`]：线程安全的指令接口（任意线程调用）
//! - [`ControlLoop`]：20ms 固定周期控制循环（独立线程）
//! - [`gate`]：校准门控，未校准时只允许 `Stopped` / `Manual`
//! - [`GripperController`]：连接/断开时序与控制线程生命周期
//!
//! 两个并发域（传输层任务与控制线程）只通过一把锁保护的运动状态交互。
//!
//! ```rust,no_run
//! use gripper_control::{ControllerConfig, GripperController};
//! use gripper_driver::SimActuator;
//!
//! # fn main() -> Result<(), gripper_control::ControlError> {
//! let mut controller = GripperController::new(SimActuator::default(), ControllerConfig::default())?;
//! controller.connect()?;
//!
//! let commands = controller.commands();
//! commands.request_position(-3.3)?;
//! println!("{:?}", commands.snapshot());
//!
//! controller.disconnect()?;
//! # Ok(())
//! # }
//! ```

mod command;
mod config;
mod control_loop;
mod controller;
mod envelope;
mod error;
pub mod gate;
mod metrics;
mod state;
mod surface;

pub use command::{Bound, CommandOutcome, GripperCommand};
pub use config::ControllerConfig;
pub use control_loop::{ControlLoop, TickOutcome};
pub use controller::GripperController;
pub use envelope::{CommandEnvelope, OutboundMessage};
pub use error::ControlError;
pub use metrics::{LoopMetrics, MetricsSnapshot};
pub use state::{MotionMode, MotionRequest, MotionSnapshot};
pub use surface::CommandSurface;
