use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use ushadow_definitions::{BackendType, Instance, InstanceStatus};
use ushadow_filebacked::InstancePatch;

use crate::state::AppContext;

pub async fn list(ctx: web::Data<AppContext>) -> HttpResponse {
    let instances = ctx.with_instances(|s| s.list().into_iter().cloned().collect::<Vec<_>>());
    HttpResponse::Ok().json(instances)
}

pub async fn get(ctx: web::Data<AppContext>, path: web::Path<String>) -> HttpResponse {
    match ctx.with_instances(|s| s.get(&path).cloned()) {
        Some(inst) => HttpResponse::Ok().json(inst),
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": format!("unknown instance '{}'", path) })),
    }
}

#[derive(Deserialize)]
pub struct CreateInstanceBody {
    pub id: String,
    pub template_id: String,
    pub display_name: String,
    #[serde(default)]
    pub config: BTreeMap<String, ushadow_settings::Value>,
}

pub async fn create(ctx: web::Data<AppContext>, body: web::Json<CreateInstanceBody>) -> HttpResponse {
    let body = body.into_inner();
    if ctx.with_templates(|t| t.get(&body.template_id).is_none()) {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": format!("unknown template '{}'", body.template_id) }));
    }
    let mut inst = Instance::new(body.id, body.template_id, body.display_name);
    inst.config = body.config;
    match ctx.with_instances_mut(|s| s.create(inst.clone())) {
        Ok(()) => HttpResponse::Created().json(inst),
        Err(e) => HttpResponse::Conflict().json(serde_json::json!({ "error": e.to_string() })),
    }
}

#[derive(Deserialize, Default)]
pub struct UpdateInstanceBody {
    pub display_name: Option<String>,
    pub config: Option<BTreeMap<String, ushadow_settings::Value>>,
    pub status: Option<InstanceStatus>,
}

pub async fn update(ctx: web::Data<AppContext>, path: web::Path<String>, body: web::Json<UpdateInstanceBody>) -> HttpResponse {
    let body = body.into_inner();
    let patch = InstancePatch {
        display_name: body.display_name,
        config: body.config,
        status: body.status,
        last_error: None,
    };
    match ctx.with_instances_mut(|s| s.update(&path, patch)) {
        Ok(inst) => HttpResponse::Ok().json(inst),
        Err(e) => HttpResponse::NotFound().json(serde_json::json!({ "error": e.to_string() })),
    }
}

pub async fn delete(ctx: web::Data<AppContext>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    let active = ctx.active_deployments_for(&id);
    if !active.is_empty() {
        return HttpResponse::Conflict()
            .json(serde_json::json!({ "error": format!("'{}' has {} active deployment(s)", id, active.len()) }));
    }
    match ctx.with_instances_mut(|s| s.delete(&id)) {
        Ok(_) => {
            let _ = ctx.with_wiring_mut(|w| w.remove_instance_references(&id));
            HttpResponse::NoContent().finish()
        }
        Err(e) => HttpResponse::NotFound().json(serde_json::json!({ "error": e.to_string() })),
    }
}

#[derive(Deserialize)]
pub struct DeployBody {
    pub backend_type: BackendType,
    pub target: String,
    pub namespace: Option<String>,
}

pub async fn deploy(ctx: web::Data<AppContext>, path: web::Path<String>, body: web::Json<DeployBody>) -> HttpResponse {
    let instance_id = path.into_inner();
    let body = body.into_inner();

    // Resolution happens synchronously, entirely within the store locks;
    // they are released before the async compose/backend call so a slow
    // remote deploy never blocks other requests from reading state.
    let prepared = ctx.with_templates(|templates| {
        ctx.with_instances(|instances| {
            ctx.with_wiring(|wiring| ctx.with_settings_mut(|settings| ctx.deployer.prepare_deploy(templates, instances, wiring, settings, &instance_id)))
        })
    });
    let prepared = match prepared {
        Ok(p) => p,
        Err(e) => return HttpResponse::UnprocessableEntity().json(serde_json::json!({ "error": e.to_string() })),
    };

    let result = ctx.deployer.deploy_resolved(prepared, body.backend_type, &body.target, body.namespace.as_deref()).await;

    match result {
        Ok(deployment) => {
            ctx.with_instances_mut(|s| {
                let _ = s.update_status(&instance_id, InstanceStatus::Deployed, deployment.access_url.clone(), None);
            });
            ctx.record_deployment(deployment.clone());
            HttpResponse::Ok().json(deployment)
        }
        Err(e) => {
            ctx.with_instances_mut(|s| {
                let _ = s.update_status(&instance_id, InstanceStatus::Error, None, Some(e.to_string()));
            });
            HttpResponse::UnprocessableEntity().json(serde_json::json!({ "error": e.to_string() }))
        }
    }
}

pub async fn logs(ctx: web::Data<AppContext>, path: web::Path<String>) -> HttpResponse {
    let deployment_id = path.into_inner();
    match ctx.get_deployment(&deployment_id) {
        Some(deployment) => match ctx.deployer.logs(&deployment, 200).await {
            Ok(lines) => HttpResponse::Ok().json(lines),
            Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({ "error": e.to_string() })),
        },
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": format!("unknown deployment '{}'", deployment_id) })),
    }
}
