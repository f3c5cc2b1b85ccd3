//! HTTP 接口
//!
//! - `POST /grasp` `/release` `/reciprocate` `/stop` → `{"status":"ok","mode":...}`
//! - `POST /command` → 指令信封 `{"command":...,"value":...}`
//! - `GET /status` → 状态快照
//! - `GET /metrics` → 控制循环计数器
//! - `GET /ws` → WebSocket（见 [`crate::ws`]）
//!
//! 错误统一为 `{"status":"error","message":...}`：请求格式问题 400，状态不允许 409。

use actix_web::{HttpResponse, Responder, get, post, web};
use gripper_control::{CommandEnvelope, CommandSurface, ControlError, MotionRequest};
use serde_json::json;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(status)
        .service(metrics)
        .service(grasp)
        .service(release)
        .service(reciprocate)
        .service(stop)
        .service(command)
        .service(crate::ws::ws_session);
}

#[get("/status")]
async fn status(surface: web::Data<CommandSurface>) -> impl Responder {
    HttpResponse::Ok().json(surface.snapshot())
}

#[get("/metrics")]
async fn metrics(surface: web::Data<CommandSurface>) -> impl Responder {
    HttpResponse::Ok().json(surface.metrics())
}

#[post("/grasp")]
async fn grasp(surface: web::Data<CommandSurface>) -> HttpResponse {
    request_motion(&surface, MotionRequest::Grasp)
}

#[post("/release")]
async fn release(surface: web::Data<CommandSurface>) -> HttpResponse {
    request_motion(&surface, MotionRequest::Release)
}

#[post("/reciprocate")]
async fn reciprocate(surface: web::Data<CommandSurface>) -> HttpResponse {
    request_motion(&surface, MotionRequest::Reciprocate)
}

#[post("/stop")]
async fn stop(surface: web::Data<CommandSurface>) -> HttpResponse {
    request_motion(&surface, MotionRequest::Stop)
}

#[post("/command")]
async fn command(surface: web::Data<CommandSurface>, body: String) -> HttpResponse {
    let result = CommandEnvelope::from_json(&body)
        .and_then(|envelope| envelope.to_command())
        .and_then(|cmd| surface.execute(cmd).map(|outcome| (cmd, outcome)));

    match result {
        Ok((cmd, outcome)) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "command": cmd.name(),
            "outcome": outcome,
            "state": surface.snapshot(),
        })),
        Err(e) => error_response(&e),
    }
}

fn request_motion(surface: &CommandSurface, request: MotionRequest) -> HttpResponse {
    match surface.request_mode(request) {
        Ok(mode) => HttpResponse::Ok().json(json!({ "status": "ok", "mode": mode })),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &ControlError) -> HttpResponse {
    let body = json!({ "status": "error", "message": err.to_string() });
    if err.is_malformed_request() {
        HttpResponse::BadRequest().json(body)
    } else {
        HttpResponse::Conflict().json(body)
    }
}
