//! # Gripper Driver Layer
//!
//! 执行器驱动边界层，提供统一的电机驱动抽象：
//! - [`ActuatorDriver`] trait：打开/绑定/切换控制模式/使能/失能/关闭
//! - [`MitCommand`]：MIT 混合控制指令（kp, kd, q, dq, tau）
//! - [`Feedback`]：位置/扭矩反馈
//! - [`sim`]：无硬件依赖的仿真夹爪（开发和测试使用）
//!
//! 具体总线协议（串口转 CAN 等）不在本 crate 范围内，由实现 [`ActuatorDriver`] 的后端负责。

mod command;
mod error;
pub mod sim;

pub use command::{ControlMode, Feedback, MitCommand};
pub use error::DriverError;
pub use sim::{SimActuator, SimConfig, SimEvent, SimHandle};

/// 单执行器驱动接口
///
/// 控制核心独占驱动实例：连接时移动到控制线程，断开时再取回执行安全关停序列。
/// 所有方法都可能阻塞在总线 IO 上，调用方不得在持有状态锁时调用。
pub trait ActuatorDriver: Send + 'static {
    /// 打开底层传输（串口 / CAN 适配器）
    fn open(&mut self) -> Result<(), DriverError>;

    /// 将控制器绑定到目标电机
    fn bind(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    /// 切换电机控制模式
    fn set_control_mode(&mut self, mode: ControlMode) -> Result<(), DriverError>;

    fn enable(&mut self) -> Result<(), DriverError>;

    fn disable(&mut self) -> Result<(), DriverError>;

    /// 读取最新反馈
    ///
    /// 没有新样本时返回 `None`（不是错误）。
    fn read_feedback(&mut self) -> Option<Feedback>;

    /// 发送一条 MIT 控制指令
    fn send_command(&mut self, command: MitCommand) -> Result<(), DriverError>;

    /// 关闭底层传输
    fn close(&mut self) -> Result<(), DriverError>;

    /// 电机当前是否处于使能状态
    fn is_enabled(&self) -> bool;
}

impl<T: ActuatorDriver + ?Sized> ActuatorDriver for Box<T> {
    fn open(&mut self) -> Result<(), DriverError> {
        (**self).open()
    }

    fn bind(&mut self) -> Result<(), DriverError> {
        (**self).bind()
    }

    fn set_control_mode(&mut self, mode: ControlMode) -> Result<(), DriverError> {
        (**self).set_control_mode(mode)
    }

    fn enable(&mut self) -> Result<(), DriverError> {
        (**self).enable()
    }

    fn disable(&mut self) -> Result<(), DriverError> {
        (**self).disable()
    }

    fn read_feedback(&mut self) -> Option<Feedback> {
        (**self).read_feedback()
    }

    fn send_command(&mut self, command: MitCommand) -> Result<(), DriverError> {
        (**self).send_command(command)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        (**self).close()
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }
}
