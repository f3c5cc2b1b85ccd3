//! 夹爪控制器：连接/断开时序与控制线程生命周期
//!
//! 连接顺序：启动控制线程（等待驱动）→ 打开传输 → 绑定电机 → 切换 MIT 模式 → 使能
//! → 读取初始位置 → 将驱动交给控制线程。
//!
//! 断开顺序：通知控制线程停止 → 等待其退出 → 零扭矩指令 → 失能 → 关闭传输。
//! 等待有上限（`teardown_timeout`）；超时后关停序列转入后台，控制线程一旦退出即执行，
//! 不会在控制线程仍持有驱动时强行关闭传输。

use crate::config::ControllerConfig;
use crate::control_loop::ControlLoop;
use crate::error::ControlError;
use crate::metrics::MetricsSnapshot;
use crate::state::{MotionMode, MotionSnapshot};
use crate::surface::CommandSurface;
use crossbeam_channel::RecvTimeoutError;
use gripper_driver::{ActuatorDriver, ControlMode, DriverError, Feedback, MitCommand};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

struct RunningLoop<D> {
    is_running: Arc<AtomicBool>,
    handle: JoinHandle<Option<D>>,
}

/// 控制线程主体：收到驱动后运行控制循环，通道关闭则直接退出
type ControlThreadBody<D> = Box<dyn FnOnce() -> Option<D> + Send>;

/// 控制线程的创建方式
pub(crate) trait SpawnControlThread<D>: Send + Sync {
    fn spawn(&self, body: ControlThreadBody<D>) -> io::Result<JoinHandle<Option<D>>>;
}

/// 命名为 `gripper-control` 的系统线程
struct NamedThread;

impl<D: Send + 'static> SpawnControlThread<D> for NamedThread {
    fn spawn(&self, body: ControlThreadBody<D>) -> io::Result<JoinHandle<Option<D>>> {
        thread::Builder::new().name("gripper-control".into()).spawn(body)
    }
}

/// 控制线程退出后交回的结果
type ShutdownReport<D> = Result<(D, Result<(), ControlError>), ControlError>;

/// 单夹爪控制器
///
/// 独占驱动实例。连接期间驱动移动到控制线程中，断开时取回并执行安全关停。
/// 通过 [`commands`](Self::commands) 获取可克隆的指令接口交给传输层。
pub struct GripperController<D: ActuatorDriver> {
    surface: CommandSurface,
    driver: Option<D>,
    running: Option<RunningLoop<D>>,
    spawner: Box<dyn SpawnControlThread<D>>,
}

impl<D: ActuatorDriver> GripperController<D> {
    pub fn new(driver: D, config: ControllerConfig) -> Result<Self, ControlError> {
        Self::with_spawner(driver, config, Box::new(NamedThread))
    }

    pub(crate) fn with_spawner(
        driver: D,
        config: ControllerConfig,
        spawner: Box<dyn SpawnControlThread<D>>,
    ) -> Result<Self, ControlError> {
        Ok(Self {
            surface: CommandSurface::new(config)?,
            driver: Some(driver),
            running: None,
            spawner,
        })
    }

    /// 指令接口句柄
    pub fn commands(&self) -> CommandSurface {
        self.surface.clone()
    }

    pub fn snapshot(&self) -> MotionSnapshot {
        self.surface.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.surface.metrics()
    }

    /// 控制线程是否在运行
    pub fn is_connected(&self) -> bool {
        self.running.is_some()
    }

    /// 连接执行器并启动控制线程
    ///
    /// 已连接时直接返回 `Ok`。任一步骤失败时控制线程不会进入循环，
    /// 驱动被关闭后保留在控制器中，可以再次调用重试。
    ///
    /// 控制线程先于使能启动，驱动在使能完成后通过通道交给它。
    /// 线程创建失败时执行器尚未被触碰；交接失败时驱动原路退回并执行安全关停。
    pub fn connect(&mut self) -> Result<(), ControlError> {
        if self.running.is_some() {
            debug!("Already connected");
            return Ok(());
        }

        let mut driver = self.driver.take().ok_or(ControlError::DriverUnavailable)?;

        let is_running = Arc::new(AtomicBool::new(true));
        let (handover_tx, handover_rx) = crossbeam_channel::bounded::<D>(1);
        let control_loop = ControlLoop::new(&self.surface);
        let flag = Arc::clone(&is_running);
        let spawned = self.spawner.spawn(Box::new(move || {
            let driver = handover_rx.recv().ok()?;
            Some(control_loop.run(driver, flag))
        }));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn control thread: {}", e);
                self.driver = Some(driver);
                return Err(ControlError::Spawn(e));
            },
        };

        let initial = match bring_up(&mut driver) {
            Ok(initial) => initial,
            Err(e) => {
                error!("Gripper bring-up failed: {}", e);
                if let Err(close_err) = driver.close() {
                    debug!("Close after failed bring-up: {}", close_err);
                }
                drop(handover_tx);
                let _ = handle.join();
                self.driver = Some(driver);
                return Err(e);
            },
        };

        {
            let mut state = self.surface.shared().state.lock();
            let Feedback { position, torque } = initial.unwrap_or_default();
            state.position = position;
            state.torque = torque;
            state.target_position = position;
            state.mode = MotionMode::Stopped;
            state.is_connected = true;
        }
        match initial {
            Some(fb) => info!("Initial position {:.4}", fb.position),
            None => warn!("No initial feedback sample, set-point defaults to 0.0"),
        }

        if let Err(crossbeam_channel::SendError(mut driver)) = handover_tx.send(driver) {
            error!("Control thread exited before taking the driver");
            let _ = handle.join();
            self.surface.shared().reset();
            let config = self.surface.config();
            if let Err(e) =
                safe_shutdown(&mut driver, config.torque_kd, config.zero_command_settle())
            {
                error!("Safe shutdown incomplete: {}", e);
            }
            self.driver = Some(driver);
            return Err(ControlError::LoopPanicked);
        }

        self.running = Some(RunningLoop { is_running, handle });
        info!("Gripper connected");
        Ok(())
    }

    /// 停止控制线程并执行安全关停
    ///
    /// 未连接时直接返回 `Ok`。本次连接的运动状态（包括校准）随之丢弃。
    pub fn disconnect(&mut self) -> Result<(), ControlError> {
        let Some(running) = self.running.take() else {
            debug!("Not connected");
            return Ok(());
        };
        info!("Disconnecting gripper...");

        // Release: 控制线程看到 false 时，之前的所有写入都可见
        running.is_running.store(false, Ordering::Release);

        let config = self.surface.config();
        let timeout = config.teardown_timeout();
        let kd = config.torque_kd;
        let settle = config.zero_command_settle();

        let (tx, rx) = crossbeam_channel::bounded::<ShutdownReport<D>>(1);

        // 看门狗线程：join 控制线程后立即执行关停，与调用方是否仍在等待无关
        thread::spawn(move || {
            let report = match running.handle.join() {
                Ok(Some(mut driver)) => {
                    let result = safe_shutdown(&mut driver, kd, settle);
                    Ok((driver, result))
                },
                Ok(None) | Err(_) => Err(ControlError::LoopPanicked),
            };
            if let Err(crossbeam_channel::SendError(late)) = tx.send(report) {
                match late {
                    Ok((_, Ok(()))) => {
                        warn!("Deferred safe shutdown completed after teardown timeout")
                    },
                    Ok((_, Err(e))) => error!("Deferred safe shutdown failed: {}", e),
                    Err(e) => error!("Deferred safe shutdown skipped: {}", e),
                }
            }
        });

        let received = rx.recv_timeout(timeout);
        self.surface.shared().reset();

        match received {
            Ok(Ok((driver, result))) => {
                self.driver = Some(driver);
                match result {
                    Ok(()) => {
                        info!("Gripper disconnected safely");
                        Ok(())
                    },
                    Err(e) => {
                        error!("Safe shutdown incomplete: {}", e);
                        Err(e)
                    },
                }
            },
            Ok(Err(e)) => {
                error!("Control loop panicked, actuator state unknown");
                Err(e)
            },
            Err(RecvTimeoutError::Timeout) => {
                error!(
                    "Control loop did not stop within {:?}, safe shutdown continues in background",
                    timeout
                );
                Err(ControlError::ShutdownTimeout(timeout))
            },
            Err(RecvTimeoutError::Disconnected) => Err(ControlError::LoopPanicked),
        }
    }
}

impl<D: ActuatorDriver> Drop for GripperController<D> {
    fn drop(&mut self) {
        if self.running.is_some()
            && let Err(e) = self.disconnect()
        {
            error!("Disconnect on drop failed: {}", e);
        }
    }
}

fn bring_up<D: ActuatorDriver>(driver: &mut D) -> Result<Option<Feedback>, ControlError> {
    driver.open()?;
    driver.bind()?;
    driver.set_control_mode(ControlMode::Mit)?;
    driver.enable()?;
    info!("Actuator enabled (MIT mode)");
    Ok(driver.read_feedback())
}

/// 零扭矩 → 等待 → 失能 → 关闭
///
/// 执行器未使能时只关闭传输。任一步失败仍继续后续步骤，返回第一个错误。
fn safe_shutdown<D: ActuatorDriver>(
    driver: &mut D,
    kd: f64,
    settle: Duration,
) -> Result<(), ControlError> {
    let mut first_error: Option<DriverError> = None;
    let mut record = |step: &str, result: Result<(), DriverError>| {
        if let Err(e) = result {
            warn!("Safe shutdown: {} failed: {}", step, e);
            first_error.get_or_insert(e);
        }
    };

    if driver.is_enabled() {
        record("zero command", driver.send_command(MitCommand::zero(kd)));
        spin_sleep::sleep(settle);
        record("disable", driver.disable());
    } else {
        debug!("Actuator already disabled, skipping zero command");
    }
    record("close", driver.close());

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gripper_driver::{SimActuator, SimConfig, SimEvent};

    /// 线程创建总是失败
    struct FailingSpawn;

    impl SpawnControlThread<SimActuator> for FailingSpawn {
        fn spawn(
            &self,
            _body: ControlThreadBody<SimActuator>,
        ) -> io::Result<JoinHandle<Option<SimActuator>>> {
            Err(io::Error::other("thread limit reached"))
        }
    }

    /// 线程立即退出，不接收驱动
    struct ExitingSpawn;

    impl SpawnControlThread<SimActuator> for ExitingSpawn {
        fn spawn(
            &self,
            body: ControlThreadBody<SimActuator>,
        ) -> io::Result<JoinHandle<Option<SimActuator>>> {
            drop(body);
            Ok(thread::spawn(|| None))
        }
    }

    #[test]
    fn test_spawn_failure_leaves_actuator_untouched() {
        let sim = SimActuator::new(SimConfig::default());
        let handle = sim.handle();
        let mut controller =
            GripperController::with_spawner(sim, ControllerConfig::default(), Box::new(FailingSpawn))
                .unwrap();

        assert!(matches!(controller.connect(), Err(ControlError::Spawn(_))));
        assert!(!controller.is_connected());
        assert!(handle.events().is_empty());
        assert!(!handle.is_enabled());
        assert!(!controller.snapshot().is_connected);

        // 驱动仍在控制器中
        assert!(matches!(controller.connect(), Err(ControlError::Spawn(_))));
    }

    #[test]
    fn test_handover_failure_runs_safe_shutdown() {
        let sim = SimActuator::new(SimConfig::default());
        let handle = sim.handle();
        let mut controller =
            GripperController::with_spawner(sim, ControllerConfig::default(), Box::new(ExitingSpawn))
                .unwrap();

        assert!(matches!(controller.connect(), Err(ControlError::LoopPanicked)));
        assert!(!controller.is_connected());
        assert!(!handle.is_enabled());
        assert!(!handle.is_open());
        assert!(!controller.snapshot().is_connected);

        let events = handle.events();
        let tail = &events[events.len() - 3..];
        assert_eq!(
            tail,
            &[
                SimEvent::Command(MitCommand::zero(1.0)),
                SimEvent::Disable,
                SimEvent::Close
            ]
        );

        // 驱动已退回，可再次尝试
        assert!(matches!(controller.connect(), Err(ControlError::LoopPanicked)));
    }

    #[test]
    fn test_safe_shutdown_skips_disabled_actuator() {
        let mut sim = SimActuator::new(SimConfig::default());
        let handle = sim.handle();
        sim.open().unwrap();
        handle.clear_events();

        safe_shutdown(&mut sim, 1.0, Duration::ZERO).unwrap();
        assert_eq!(handle.events(), vec![SimEvent::Close]);
    }
}
