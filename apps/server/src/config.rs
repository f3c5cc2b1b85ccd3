//! 服务配置（TOML）
//!
//! ```toml
//! [controller]
//! period_ms = 20
//! move_torque = 0.8
//!
//! [server]
//! listen = "0.0.0.0:8765"
//! telemetry_interval_ms = 100
//!
//! [driver]
//! kind = "sim"
//! initial_position = -3.4
//! ```

use anyhow::{Context, Result, bail};
use gripper_control::ControllerConfig;
use gripper_driver::{ActuatorDriver, SimActuator, SimConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// 服务完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub controller: ControllerConfig,
    pub server: ServerConfig,
    pub driver: DriverConfig,
}

/// HTTP / WebSocket 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub listen: SocketAddr,
    /// 遥测推送间隔（毫秒）
    pub telemetry_interval_ms: u64,
    /// 单个客户端发送超时（毫秒），超时即断开该客户端
    pub send_timeout_ms: u64,
    /// 遥测广播缓冲（帧），落后超过该值的客户端丢帧
    pub telemetry_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8765)),
            telemetry_interval_ms: 100,
            send_timeout_ms: 250,
            telemetry_buffer: 16,
        }
    }
}

impl ServerConfig {
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// 驱动后端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DriverConfig {
    /// 仿真夹爪
    Sim(SimConfig),
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig::Sim(SimConfig::default())
    }
}

impl DriverConfig {
    pub fn build(&self) -> Box<dyn ActuatorDriver> {
        match self {
            DriverConfig::Sim(sim) => {
                info!("Using simulated gripper ({:?})", sim);
                Box::new(SimActuator::new(sim.clone()))
            },
        }
    }
}

impl AppConfig {
    /// 读取配置文件；`path` 为 `None` 时使用默认配置
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            },
            None => Self::default(),
        };
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.controller.validate()?;

        if self.server.telemetry_interval_ms == 0 {
            bail!("server.telemetry_interval_ms must be positive");
        }
        if self.server.send_timeout_ms == 0 {
            bail!("server.send_timeout_ms must be positive");
        }
        if self.server.telemetry_buffer == 0 {
            bail!("server.telemetry_buffer must be positive");
        }

        let DriverConfig::Sim(sim) = &self.driver;
        if sim.lower_stop >= sim.upper_stop {
            bail!(
                "driver.lower_stop ({}) must be below driver.upper_stop ({})",
                sim.lower_stop,
                sim.upper_stop
            );
        }
        if !(0.0..=1.0).contains(&sim.feedback_dropout) {
            bail!("driver.feedback_dropout must be within [0, 1]");
        }
        Ok(())
    }
}
