use actix_web::{web, HttpResponse};
use serde::Deserialize;

use ushadow_definitions::Wiring;

use crate::state::AppContext;

pub async fn list(ctx: web::Data<AppContext>) -> HttpResponse {
    let wirings = ctx.with_wiring(|w| w.list().to_vec());
    HttpResponse::Ok().json(wirings)
}

#[derive(Deserialize)]
pub struct CreateWiringBody {
    pub id: String,
    pub source_instance_id: String,
    pub source_capability: String,
    pub target_instance_id: String,
    pub target_capability: String,
}

pub async fn create(ctx: web::Data<AppContext>, body: web::Json<CreateWiringBody>) -> HttpResponse {
    let body = body.into_inner();

    let source_exists = ctx.with_instances(|s| s.get(&body.source_instance_id).is_some());
    let target_exists = ctx.with_instances(|s| s.get(&body.target_instance_id).is_some());
    if !source_exists || !target_exists {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": "source and target instances must both exist" }));
    }

    let wiring = Wiring::new(body.id, body.source_instance_id, body.source_capability, body.target_instance_id, body.target_capability);
    match ctx.with_wiring_mut(|w| w.create(wiring)) {
        Ok(w) => HttpResponse::Created().json(w),
        Err(e) => HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() })),
    }
}

pub async fn delete(ctx: web::Data<AppContext>, path: web::Path<String>) -> HttpResponse {
    match ctx.with_wiring_mut(|w| w.delete(&path)) {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => HttpResponse::NotFound().json(serde_json::json!({ "error": e.to_string() })),
    }
}

pub async fn get_defaults(ctx: web::Data<AppContext>) -> HttpResponse {
    let defaults = ctx.with_wiring(|w| w.get_defaults().clone());
    HttpResponse::Ok().json(defaults)
}

#[derive(Deserialize)]
pub struct SetDefaultBody {
    pub source_instance_id: String,
}

pub async fn set_default(ctx: web::Data<AppContext>, path: web::Path<String>, body: web::Json<SetDefaultBody>) -> HttpResponse {
    let capability = path.into_inner();
    match ctx.with_wiring_mut(|w| w.set_default(&capability, &body.source_instance_id)) {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() })),
    }
}
