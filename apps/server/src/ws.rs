//! WebSocket 会话
//!
//! 连接后立即推送一帧 status，此后每个遥测周期推送一帧；
//! 每条入站文本帧按指令信封解析并执行，回复 ack 或 error（只发给该客户端）。

use crate::config::ServerConfig;
use crate::telemetry::{TelemetryHub, status_frame};
use actix_web::{Error, HttpRequest, HttpResponse, get, web};
use actix_ws::{Message, Session};
use gripper_control::{CommandEnvelope, CommandSurface, OutboundMessage};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

#[get("/ws")]
pub async fn ws_session(
    req: HttpRequest,
    body: web::Payload,
    surface: web::Data<CommandSurface>,
    hub: web::Data<TelemetryHub>,
    settings: web::Data<ServerConfig>,
) -> Result<HttpResponse, Error> {
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;

    let surface = surface.get_ref().clone();
    let mut telemetry = hub.subscribe();
    let send_timeout = settings.send_timeout();
    let peer = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    info!(
        "WebSocket client connected: {} ({} active)",
        peer,
        hub.subscribers()
    );

    actix_web::rt::spawn(async move {
        let greeted = match status_frame(&surface) {
            Some(frame) => send_text(&mut session, frame, send_timeout, &peer).await,
            None => false,
        };

        if greeted {
            loop {
                tokio::select! {
                    frame = telemetry.recv() => match frame {
                        Ok(frame) => {
                            if !send_text(&mut session, frame, send_timeout, &peer).await {
                                break;
                            }
                        },
                        Err(RecvError::Lagged(n)) => {
                            debug!("Client {} lagging, dropped {} telemetry frames", peer, n);
                        },
                        Err(RecvError::Closed) => break,
                    },
                    msg = msg_stream.recv() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let reply = handle_text(&surface, &text);
                            match reply.to_json() {
                                Ok(json) => {
                                    if !send_text(&mut session, json, send_timeout, &peer).await {
                                        break;
                                    }
                                },
                                Err(e) => error!("Failed to serialize reply: {}", e),
                            }
                        },
                        Some(Ok(Message::Ping(bytes))) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        },
                        Some(Ok(Message::Close(reason))) => {
                            debug!("Client {} closed: {:?}", peer, reason);
                            break;
                        },
                        Some(Ok(_)) => {},
                        Some(Err(e)) => {
                            debug!("Client {} protocol error: {}", peer, e);
                            break;
                        },
                        None => break,
                    },
                }
            }
        }

        let _ = session.close(None).await;
        info!("WebSocket client disconnected: {}", peer);
    });

    Ok(response)
}

/// 解析并执行一条入站指令，返回给该客户端的回复
pub fn handle_text(surface: &CommandSurface, text: &str) -> OutboundMessage {
    let result = CommandEnvelope::from_json(text)
        .and_then(|envelope| envelope.to_command())
        .and_then(|command| surface.execute(command).map(|_| command.name()));

    match result {
        Ok(name) => OutboundMessage::Ack {
            command: name.to_string(),
        },
        Err(e) => {
            debug!("Rejected WebSocket command {:?}: {}", text, e);
            OutboundMessage::Error {
                message: e.to_string(),
            }
        },
    }
}

/// 带超时发送；失败或超时返回 `false`，调用方应断开该客户端
async fn send_text(session: &mut Session, text: String, timeout: Duration, peer: &str) -> bool {
    match tokio::time::timeout(timeout, session.text(text)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => {
            debug!("Client {} session closed", peer);
            false
        },
        Err(_) => {
            warn!(
                "Client {} did not accept a frame within {:?}, dropping",
                peer, timeout
            );
            false
        },
    }
}
