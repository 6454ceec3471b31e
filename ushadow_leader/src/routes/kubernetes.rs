use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::state::AppContext;

pub async fn list(ctx: web::Data<AppContext>) -> HttpResponse {
    HttpResponse::Ok().json(ctx.clusters.list())
}

pub async fn get(ctx: web::Data<AppContext>, path: web::Path<String>) -> HttpResponse {
    match ctx.clusters.get(&path) {
        Some(cluster) => HttpResponse::Ok().json(cluster),
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": format!("unknown cluster '{}'", path) })),
    }
}

#[derive(Deserialize)]
pub struct RegisterClusterBody {
    pub id: String,
    pub display_name: String,
    pub kubeconfig: String,
}

pub async fn register(ctx: web::Data<AppContext>, body: web::Json<RegisterClusterBody>) -> HttpResponse {
    let body = body.into_inner();
    match ctx.clusters.register(body.id, body.display_name, &body.kubeconfig).await {
        Ok(cluster) => HttpResponse::Created().json(cluster),
        Err(e) => HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() })),
    }
}

pub async fn remove(ctx: web::Data<AppContext>, path: web::Path<String>) -> HttpResponse {
    match ctx.clusters.remove(&path) {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => HttpResponse::NotFound().json(serde_json::json!({ "error": e.to_string() })),
    }
}

#[derive(Deserialize)]
pub struct ScanInfraQuery {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

pub async fn scan_infra(ctx: web::Data<AppContext>, path: web::Path<String>, query: web::Query<ScanInfraQuery>) -> HttpResponse {
    match ctx.clusters.scan_infra(&path, &query.namespace).await {
        Ok(scan) => HttpResponse::Ok().json(scan),
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({ "error": e.to_string() })),
    }
}
