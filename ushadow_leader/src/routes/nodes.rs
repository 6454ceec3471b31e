use actix_web::{web, HttpResponse};
use serde::Deserialize;

use ushadow_core::fleet::BootstrapShell;
use ushadow_definitions::node::NodeCapabilities;
use ushadow_definitions::NodeType;

use crate::state::AppContext;

pub async fn list(ctx: web::Data<AppContext>) -> HttpResponse {
    HttpResponse::Ok().json(ctx.fleet.list())
}

pub async fn get(ctx: web::Data<AppContext>, path: web::Path<String>) -> HttpResponse {
    match ctx.fleet.get(&path) {
        Some(node) => HttpResponse::Ok().json(node),
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": format!("unknown node '{}'", path) })),
    }
}

#[derive(Deserialize)]
pub struct CreateTokenBody {
    #[serde(default)]
    pub shell: Option<String>,
}

pub async fn create_token(ctx: web::Data<AppContext>, body: web::Json<CreateTokenBody>) -> HttpResponse {
    let token = ctx.fleet.create_token();
    let leader_address = std::env::var("USHADOW_LEADER_MESH_ADDRESS").unwrap_or_else(|_| "leader.internal".to_string());
    let shell = match body.shell.as_deref() {
        Some("powershell") => BootstrapShell::PowerShell,
        _ => BootstrapShell::Bash,
    };
    let script = ctx.fleet.render_bootstrap_script(&leader_address, &token, shell);
    HttpResponse::Ok().json(serde_json::json!({ "token": token, "install_command": script }))
}

#[derive(Deserialize)]
pub struct RegisterBody {
    pub token: String,
    pub node_id: String,
    pub display_name: String,
    pub node_type: NodeType,
    pub mesh_address: String,
    #[serde(default)]
    pub capabilities: NodeCapabilities,
    pub agent_version: String,
}

pub async fn register(ctx: web::Data<AppContext>, body: web::Json<RegisterBody>) -> HttpResponse {
    let body = body.into_inner();
    match ctx.fleet.register_unode(
        &body.token,
        body.node_id,
        body.display_name,
        body.node_type,
        body.mesh_address,
        body.capabilities,
        body.agent_version,
    ) {
        Ok(node) => HttpResponse::Created().json(node),
        Err(e) => HttpResponse::Unauthorized().json(serde_json::json!({ "error": e.to_string() })),
    }
}

pub async fn heartbeat(ctx: web::Data<AppContext>, path: web::Path<String>) -> HttpResponse {
    match ctx.fleet.heartbeat(&path) {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => HttpResponse::NotFound().json(serde_json::json!({ "error": e.to_string() })),
    }
}

pub async fn remove(ctx: web::Data<AppContext>, path: web::Path<String>) -> HttpResponse {
    match ctx.fleet.remove(&path) {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() })),
    }
}

#[derive(Deserialize)]
pub struct ClaimBody {
    pub instance_id: String,
}

pub async fn claim(ctx: web::Data<AppContext>, path: web::Path<String>, body: web::Json<ClaimBody>) -> HttpResponse {
    match ctx.fleet.claim(&path, &body.instance_id) {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => HttpResponse::NotFound().json(serde_json::json!({ "error": e.to_string() })),
    }
}

pub async fn release(ctx: web::Data<AppContext>, path: web::Path<String>, body: web::Json<ClaimBody>) -> HttpResponse {
    match ctx.fleet.release(&path, &body.instance_id) {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => HttpResponse::NotFound().json(serde_json::json!({ "error": e.to_string() })),
    }
}

pub async fn discover_peers(ctx: web::Data<AppContext>) -> HttpResponse {
    match ctx.fleet.refresh_from_mesh().await {
        Ok(()) => HttpResponse::Ok().json(ctx.fleet.list()),
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({ "error": e.to_string() })),
    }
}

pub async fn leader_info(ctx: web::Data<AppContext>) -> HttpResponse {
    let leader_address = std::env::var("USHADOW_LEADER_MESH_ADDRESS").unwrap_or_else(|_| "leader.internal".to_string());
    HttpResponse::Ok().json(serde_json::json!(ctx.fleet.leader_info(&leader_address)))
}
