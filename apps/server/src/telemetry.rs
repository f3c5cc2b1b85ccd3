//! 遥测推送
//!
//! 固定间隔采样状态快照，序列化一次后写入 `tokio::sync::broadcast`。
//! 每个 WebSocket 会话各自订阅、各自带超时发送：慢客户端只会在自己的接收端丢帧，
//! 不会拖慢其他客户端或下一次采样。

use gripper_control::{CommandSurface, OutboundMessage};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

/// 遥测广播中心
#[derive(Debug, Clone)]
pub struct TelemetryHub {
    tx: broadcast::Sender<String>,
}

impl TelemetryHub {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }

    /// 发布一帧，返回收到该帧的订阅者数量
    fn publish(&self, frame: String) -> usize {
        // 没有订阅者时 send 返回 Err，属正常情况
        self.tx.send(frame).unwrap_or(0)
    }
}

/// 当前状态的 status 信封
pub fn status_frame(surface: &CommandSurface) -> Option<String> {
    let message = OutboundMessage::Status {
        data: surface.snapshot(),
    };
    match message.to_json() {
        Ok(json) => Some(json),
        Err(e) => {
            error!("Failed to serialize telemetry: {}", e);
            None
        },
    }
}

/// 启动遥测推送任务
pub fn spawn_publisher(
    surface: CommandSurface,
    hub: TelemetryHub,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Some(frame) = status_frame(&surface) {
                let delivered = hub.publish(frame);
                if delivered > 0 {
                    debug!("Telemetry frame queued for {} client(s)", delivered);
                }
            }
        }
    })
}
