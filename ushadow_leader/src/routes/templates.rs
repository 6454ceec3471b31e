use actix_web::{web, HttpResponse};

use crate::state::AppContext;

pub async fn list(ctx: web::Data<AppContext>) -> HttpResponse {
    let templates = ctx.with_templates(|t| t.list().into_iter().cloned().collect::<Vec<_>>());
    HttpResponse::Ok().json(templates)
}

pub async fn get(ctx: web::Data<AppContext>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    match ctx.with_templates(|t| t.get(&id).cloned()) {
        Some(tpl) => HttpResponse::Ok().json(tpl),
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": format!("unknown template '{}'", id) })),
    }
}

pub async fn reload(ctx: web::Data<AppContext>) -> HttpResponse {
    match ctx.reload_templates() {
        Ok(count) => HttpResponse::Ok().json(serde_json::json!({ "templates": count })),
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({ "error": e.to_string() })),
    }
}
