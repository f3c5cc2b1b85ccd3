//! # Gripper Server
//!
//! 夹爪运动控制服务：启动时连接执行器并运行 20ms 控制线程，
//! 通过 HTTP 与 WebSocket 接收指令、推送遥测。
//!
//! ```bash
//! # 仿真夹爪，默认监听 0.0.0.0:8765
//! gripper-server
//!
//! # 指定配置文件
//! gripper-server --config gripper.toml
//!
//! # 调整日志级别
//! RUST_LOG=gripper_control=debug gripper-server
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use gripper_control::{CommandSurface, GripperController};

mod api;
mod config;
mod telemetry;
mod ws;

use config::{AppConfig, DriverConfig, ServerConfig};
use telemetry::TelemetryHub;

const DEFAULT_LOG_FILTER: &str = "gripper_server=info,gripper_control=info,gripper_driver=info";

/// Gripper Server - 夹爪运动控制服务
#[derive(Parser, Debug)]
#[command(name = "gripper-server")]
#[command(about = "Gripper motion control server (HTTP + WebSocket)", long_about = None)]
#[command(version)]
struct Args {
    /// 配置文件路径（TOML）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 监听地址，覆盖配置文件中的 `server.listen`
    ///
    /// 格式: IP:PORT (例如: 127.0.0.1:8765)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// 仿真夹爪初始位置（rad）
    #[arg(long, allow_negative_numbers = true)]
    sim_initial_position: Option<f64>,
}

impl Args {
    /// 命令行参数覆盖配置文件
    fn apply(&self, config: &mut AppConfig) {
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(position) = self.sim_initial_position {
            let DriverConfig::Sim(sim) = &mut config.driver;
            sim.initial_position = position;
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();
}

fn build_server(
    surface: CommandSurface,
    hub: TelemetryHub,
    settings: ServerConfig,
) -> std::io::Result<Server> {
    let listen = settings.listen;
    let surface = web::Data::new(surface);
    let hub = web::Data::new(hub);
    let settings = web::Data::new(settings);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(surface.clone())
            .app_data(hub.clone())
            .app_data(settings.clone())
            .configure(api::configure)
    })
    .shutdown_timeout(1)
    .disable_signals()
    .bind(listen)?
    .run();
    Ok(server)
}

/// 等待中断信号
///
/// 信号注册失败时记录错误并永不返回，服务继续运行。
async fn wait_for_interrupt<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!(
            "Failed to listen for interrupt signal, Ctrl-C will not stop the server: {}",
            e
        );
        std::future::pending::<()>().await;
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let mut controller = GripperController::new(config.driver.build(), config.controller.clone())?;
    controller.connect().context("Gripper bring-up failed")?;

    let surface = controller.commands();
    let hub = TelemetryHub::new(config.server.telemetry_buffer);
    let publisher = telemetry::spawn_publisher(
        surface.clone(),
        hub.clone(),
        config.server.telemetry_interval(),
    );

    let listen = config.server.listen;
    let served = match build_server(surface, hub, config.server.clone()) {
        Ok(server) => {
            let handle = server.handle();
            tokio::spawn(async move {
                wait_for_interrupt(tokio::signal::ctrl_c()).await;
                info!("Received interrupt signal, shutting down...");
                handle.stop(true).await;
            });
            info!("Gripper server listening on {}", listen);
            server.await
        },
        Err(e) => Err(e),
    };
    publisher.abort();

    // 无论服务是否正常退出都执行安全关停
    let disconnected = tokio::task::spawn_blocking(move || controller.disconnect()).await?;
    if let Err(e) = &disconnected {
        error!("Safe shutdown reported an error: {}", e);
    }

    served.with_context(|| format!("HTTP server on {} failed", listen))?;
    disconnected?;
    info!("Gripper server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_args_override_config() {
        let args = Args::try_parse_from([
            "gripper-server",
            "--listen",
            "127.0.0.1:9100",
            "--sim-initial-position",
            "-3.3",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.server.listen, "127.0.0.1:9100".parse().unwrap());
        let DriverConfig::Sim(sim) = &config.driver;
        assert_eq!(sim.initial_position, -3.3);
    }

    #[test]
    fn test_args_defaults_leave_config() {
        let args = Args::try_parse_from(["gripper-server"]).unwrap();
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config, AppConfig::default());
        assert!(args.config.is_none());
    }

    #[tokio::test]
    async fn test_interrupt_returns_on_signal() {
        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            wait_for_interrupt(async { Ok(()) }),
        )
        .await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_interrupt_registration_failure_keeps_serving() {
        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            wait_for_interrupt(async { Err(std::io::Error::other("no signal handler")) }),
        )
        .await;
        assert!(waited.is_err());
    }
}
