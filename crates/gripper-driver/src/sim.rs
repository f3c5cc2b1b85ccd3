//! 仿真夹爪
//!
//! 无硬件依赖的 [`ActuatorDriver`] 实现，用于开发调试和测试：
//! - 一阶刚体模型：扭矩 → 速度 → 位置（粘滞摩擦 + 机械限位）
//! - 记录事件序列（打开/模式切换/使能/指令/失能/关闭），便于断言关停顺序
//! - 可注入故障：打开失败、模式切换被拒、使能被拒、反馈中断、发送失败
//!
//! 物理量每次 `send_command()` 按真实流逝时间推进一步（上限 50ms）。

use crate::{ActuatorDriver, ControlMode, DriverError, Feedback, MitCommand};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// 事件日志容量（超出后丢弃最旧的事件）
const EVENT_LOG_CAPACITY: usize = 1024;

/// 单步积分上限（秒）
const MAX_STEP_SECS: f64 = 0.05;

/// 仿真参数
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct SimConfig {
    /// 闭合方向机械限位（rad）
    pub lower_stop: f64,
    /// 张开方向机械限位（rad）
    pub upper_stop: f64,
    /// 上电时位置（rad）
    pub initial_position: f64,
    /// 转动惯量（kg·m²）
    pub inertia: f64,
    /// 粘滞摩擦系数（Nm/(rad/s)）
    pub friction: f64,
    /// 每次读取反馈时丢样的概率（0.0 - 1.0）
    pub feedback_dropout: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            lower_stop: -3.9,
            upper_stop: -2.9,
            initial_position: -3.4,
            inertia: 0.02,
            friction: 0.2,
            feedback_dropout: 0.0,
        }
    }
}

/// 仿真驱动记录的事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimEvent {
    Open,
    Bind,
    ControlMode(ControlMode),
    Enable,
    Command(MitCommand),
    Disable,
    Close,
}

#[derive(Debug, Default)]
struct SimFaults {
    fail_open: bool,
    reject_control_mode: bool,
    reject_enable: bool,
    block_feedback: bool,
    fail_send: bool,
}

#[derive(Debug)]
struct Plant {
    config: SimConfig,
    position: f64,
    velocity: f64,
    torque: f64,
    open: bool,
    mode: Option<ControlMode>,
    enabled: bool,
    last_command: Option<MitCommand>,
    last_step: Option<Instant>,
    commands_sent: u64,
    events: VecDeque<SimEvent>,
    faults: SimFaults,
}

impl Plant {
    fn new(config: SimConfig) -> Self {
        Self {
            position: config.initial_position,
            config,
            velocity: 0.0,
            torque: 0.0,
            open: false,
            mode: None,
            enabled: false,
            last_command: None,
            last_step: None,
            commands_sent: 0,
            events: VecDeque::with_capacity(64),
            faults: SimFaults::default(),
        }
    }

    fn record(&mut self, event: SimEvent) {
        if self.events.len() == EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.open {
            Ok(())
        } else {
            Err(DriverError::NotOpen)
        }
    }

    /// 推进一步物理模型
    ///
    /// 阻尼项隐式积分，保证大 `kd / inertia` 时仍然稳定。
    fn integrate(&mut self, cmd: &MitCommand, dt: f64) {
        let inertia = self.config.inertia.max(1e-6);
        let damping = cmd.kd + self.config.friction;
        let drive = cmd.kp * (cmd.q - self.position) + cmd.kd * cmd.dq + cmd.tau;

        self.velocity = (self.velocity + dt * drive / inertia) / (1.0 + dt * damping / inertia);
        self.position += self.velocity * dt;

        if self.position <= self.config.lower_stop {
            self.position = self.config.lower_stop;
            self.velocity = self.velocity.max(0.0);
        } else if self.position >= self.config.upper_stop {
            self.position = self.config.upper_stop;
            self.velocity = self.velocity.min(0.0);
        }

        self.torque = drive - cmd.kd * self.velocity;
    }
}

/// 仿真执行器
pub struct SimActuator {
    plant: Arc<Mutex<Plant>>,
}

impl SimActuator {
    pub fn new(config: SimConfig) -> Self {
        Self {
            plant: Arc::new(Mutex::new(Plant::new(config))),
        }
    }

    /// 获取观察/注入句柄
    ///
    /// 驱动移动到控制线程后，测试和监控代码仍可通过句柄查看仿真状态。
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            plant: Arc::clone(&self.plant),
        }
    }
}

impl Default for SimActuator {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl ActuatorDriver for SimActuator {
    fn open(&mut self) -> Result<(), DriverError> {
        let mut plant = self.plant.lock();
        if plant.faults.fail_open {
            return Err(DriverError::Open("simulated port unavailable".to_string()));
        }
        plant.open = true;
        plant.record(SimEvent::Open);
        info!("Sim actuator opened at position {:.3}", plant.position);
        Ok(())
    }

    fn bind(&mut self) -> Result<(), DriverError> {
        let mut plant = self.plant.lock();
        plant.ensure_open()?;
        plant.record(SimEvent::Bind);
        Ok(())
    }

    fn set_control_mode(&mut self, mode: ControlMode) -> Result<(), DriverError> {
        let mut plant = self.plant.lock();
        plant.ensure_open()?;
        if plant.faults.reject_control_mode {
            return Err(DriverError::ControlModeRejected(mode));
        }
        plant.mode = Some(mode);
        plant.record(SimEvent::ControlMode(mode));
        Ok(())
    }

    fn enable(&mut self) -> Result<(), DriverError> {
        let mut plant = self.plant.lock();
        plant.ensure_open()?;
        if plant.faults.reject_enable {
            return Err(DriverError::EnableRejected);
        }
        plant.enabled = true;
        plant.last_step = Some(Instant::now());
        plant.record(SimEvent::Enable);
        Ok(())
    }

    fn disable(&mut self) -> Result<(), DriverError> {
        let mut plant = self.plant.lock();
        plant.ensure_open()?;
        plant.enabled = false;
        plant.record(SimEvent::Disable);
        Ok(())
    }

    fn read_feedback(&mut self) -> Option<Feedback> {
        let plant = self.plant.lock();
        if !plant.open || plant.faults.block_feedback {
            return None;
        }
        let dropout = plant.config.feedback_dropout.clamp(0.0, 1.0);
        if dropout > 0.0 && rand::thread_rng().gen_bool(dropout) {
            return None;
        }
        Some(Feedback::new(plant.position, plant.torque))
    }

    fn send_command(&mut self, command: MitCommand) -> Result<(), DriverError> {
        let mut plant = self.plant.lock();
        plant.ensure_open()?;
        if plant.faults.fail_send {
            return Err(DriverError::Device("simulated bus error".to_string()));
        }

        let now = Instant::now();
        let dt = plant
            .last_step
            .map(|t| now.duration_since(t).as_secs_f64().min(MAX_STEP_SECS))
            .unwrap_or(0.0);
        plant.last_step = Some(now);

        // 未使能或不在 MIT 模式时电机不出力
        let effective = if plant.enabled && plant.mode == Some(ControlMode::Mit) {
            command
        } else {
            MitCommand::default()
        };
        plant.integrate(&effective, dt);

        plant.last_command = Some(command);
        plant.commands_sent += 1;
        plant.record(SimEvent::Command(command));
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let mut plant = self.plant.lock();
        plant.ensure_open()?;
        plant.open = false;
        plant.record(SimEvent::Close);
        debug!("Sim actuator closed");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.plant.lock().enabled
    }
}

/// 仿真状态句柄（可 Clone，跨线程共享）
#[derive(Clone)]
pub struct SimHandle {
    plant: Arc<Mutex<Plant>>,
}

impl SimHandle {
    pub fn position(&self) -> f64 {
        self.plant.lock().position
    }

    pub fn velocity(&self) -> f64 {
        self.plant.lock().velocity
    }

    /// 直接设定位置（速度清零），用于脚本化测试场景
    pub fn set_position(&self, position: f64) {
        let mut plant = self.plant.lock();
        plant.position = position;
        plant.velocity = 0.0;
    }

    pub fn last_command(&self) -> Option<MitCommand> {
        self.plant.lock().last_command
    }

    pub fn commands_sent(&self) -> u64 {
        self.plant.lock().commands_sent
    }

    pub fn is_open(&self) -> bool {
        self.plant.lock().open
    }

    pub fn is_enabled(&self) -> bool {
        self.plant.lock().enabled
    }

    pub fn control_mode(&self) -> Option<ControlMode> {
        self.plant.lock().mode
    }

    /// 事件日志副本（按发生顺序）
    pub fn events(&self) -> Vec<SimEvent> {
        self.plant.lock().events.iter().copied().collect()
    }

    pub fn clear_events(&self) {
        self.plant.lock().events.clear();
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.plant.lock().faults.fail_open = fail;
    }

    pub fn set_reject_control_mode(&self, reject: bool) {
        self.plant.lock().faults.reject_control_mode = reject;
    }

    pub fn set_reject_enable(&self, reject: bool) {
        self.plant.lock().faults.reject_enable = reject;
    }

    /// 阻断反馈（`read_feedback()` 始终返回 `None`）
    pub fn set_block_feedback(&self, block: bool) {
        self.plant.lock().faults.block_feedback = block;
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.plant.lock().faults.fail_send = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_enabled() -> (SimActuator, SimHandle) {
        let mut sim = SimActuator::default();
        let handle = sim.handle();
        sim.open().unwrap();
        sim.bind().unwrap();
        sim.set_control_mode(ControlMode::Mit).unwrap();
        sim.enable().unwrap();
        (sim, handle)
    }

    #[test]
    fn test_requires_open() {
        let mut sim = SimActuator::default();
        assert!(matches!(sim.enable(), Err(DriverError::NotOpen)));
        assert!(matches!(
            sim.send_command(MitCommand::zero(1.0)),
            Err(DriverError::NotOpen)
        ));
        assert!(sim.read_feedback().is_none());
    }

    #[test]
    fn test_bring_up_records_events() {
        let (_sim, handle) = open_enabled();
        assert_eq!(
            handle.events(),
            vec![
                SimEvent::Open,
                SimEvent::Bind,
                SimEvent::ControlMode(ControlMode::Mit),
                SimEvent::Enable,
            ]
        );
        assert!(handle.is_enabled());
        assert_eq!(handle.control_mode(), Some(ControlMode::Mit));
    }

    #[test]
    fn test_injected_faults() {
        let mut sim = SimActuator::default();
        let handle = sim.handle();

        handle.set_fail_open(true);
        assert!(matches!(sim.open(), Err(DriverError::Open(_))));
        handle.set_fail_open(false);
        sim.open().unwrap();

        handle.set_reject_control_mode(true);
        assert!(matches!(
            sim.set_control_mode(ControlMode::Mit),
            Err(DriverError::ControlModeRejected(ControlMode::Mit))
        ));

        handle.set_reject_enable(true);
        assert!(matches!(sim.enable(), Err(DriverError::EnableRejected)));
        assert!(!handle.is_enabled());

        handle.set_block_feedback(true);
        assert!(sim.read_feedback().is_none());
        handle.set_block_feedback(false);
        assert!(sim.read_feedback().is_some());
    }

    #[test]
    fn test_negative_torque_drives_to_lower_stop() {
        let mut plant = Plant::new(SimConfig::default());
        plant.enabled = true;
        let cmd = MitCommand::torque(-0.8, 1.0);
        for _ in 0..500 {
            plant.integrate(&cmd, 0.02);
        }
        assert_eq!(plant.position, plant.config.lower_stop);
        assert_eq!(plant.velocity, 0.0);
    }

    #[test]
    fn test_hold_converges_to_target() {
        let mut plant = Plant::new(SimConfig::default());
        let cmd = MitCommand::hold(-3.1, 5.0, 1.0);
        for _ in 0..1000 {
            plant.integrate(&cmd, 0.02);
        }
        assert!((plant.position - (-3.1)).abs() < 1e-3, "position = {}", plant.position);
    }

    #[test]
    fn test_disabled_motor_ignores_command() {
        let mut sim = SimActuator::default();
        let handle = sim.handle();
        sim.open().unwrap();
        sim.set_control_mode(ControlMode::Mit).unwrap();

        let start = handle.position();
        std::thread::sleep(std::time::Duration::from_millis(5));
        sim.send_command(MitCommand::torque(2.0, 0.0)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        sim.send_command(MitCommand::torque(2.0, 0.0)).unwrap();

        assert_eq!(handle.position(), start);
        assert_eq!(handle.commands_sent(), 2);
        assert_eq!(handle.last_command(), Some(MitCommand::torque(2.0, 0.0)));
    }

    #[test]
    fn test_event_log_is_bounded() {
        let (mut sim, handle) = open_enabled();
        for _ in 0..(EVENT_LOG_CAPACITY + 10) {
            sim.send_command(MitCommand::zero(1.0)).unwrap();
        }
        let events = handle.events();
        assert_eq!(events.len(), EVENT_LOG_CAPACITY);
        assert!(events.iter().all(|e| matches!(e, SimEvent::Command(_))));
    }

    proptest::proptest! {
        #[test]
        fn position_stays_within_end_stops(
            taus in proptest::collection::vec(-5.0f64..5.0, 1..200),
            kd in 0.0f64..2.0,
        ) {
            let config = SimConfig::default();
            let mut plant = Plant::new(config.clone());
            for tau in taus {
                plant.integrate(&MitCommand::torque(tau, kd), 0.02);
                proptest::prop_assert!(plant.position >= config.lower_stop);
                proptest::prop_assert!(plant.position <= config.upper_stop);
                proptest::prop_assert!(plant.velocity.is_finite());
            }
        }
    }
}
