#[macro_use]
extern crate log;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};

use ushadow_core::mesh::ProcessMeshRouter;
use ushadow_core::FleetManager;
use ushadow_leader::state::AppContext;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env::set_var("RUST_LOG", env::var("RUST_LOG").unwrap_or_else(|_| "actix_web=info,ushadow_leader=info,ushadow_core=info".into()));
    env_logger::init();

    let data_dir = env::var("USHADOW_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./data"));
    let bind_address = env::var("USHADOW_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:7777".to_string());
    let leader_id = env::var("USHADOW_LEADER_ID").unwrap_or_else(|_| "leader".to_string());
    let leader_display_name = env::var("USHADOW_LEADER_DISPLAY_NAME").unwrap_or_else(|_| "Leader".to_string());
    let auth_secret = env::var("USHADOW_AUTH_SECRET").unwrap_or_else(|_| {
        warn!("USHADOW_AUTH_SECRET not set; using an insecure default, fine only for local development");
        "ushadow-dev-secret".to_string()
    });
    let mesh_binary = env::var("USHADOW_MESH_BINARY").unwrap_or_else(|_| "tailscale".to_string());

    std::fs::create_dir_all(&data_dir).expect("could not create data directory");

    let mesh_hostname = env::var("TAILSCALE_HOSTNAME")
        .or_else(|_| env::var("HOST_HOSTNAME"))
        .unwrap_or_else(|_| "localhost".to_string());

    let mesh: Arc<dyn ushadow_core::MeshRouter> = Arc::new(ProcessMeshRouter::new(mesh_binary));
    let fleet = Arc::new(FleetManager::new(mesh.clone(), leader_id, leader_display_name));

    let ctx = web::Data::new(
        AppContext::new(data_dir, fleet.clone(), &auth_secret, mesh, mesh_hostname)
            .await
            .expect("could not initialize application state"),
    );

    info!("ushadowd listening on {}", bind_address);
    HttpServer::new(move || {
        App::new()
            .app_data(ctx.clone())
            .wrap(middleware::Logger::default())
            .configure(ushadow_leader::routes::configure)
            .route("/health", web::get().to(|| async { "healthy" }))
    })
    .bind(&bind_address)
    .unwrap_or_else(|e| panic!("could not bind to {}: {}", bind_address, e))
    .shutdown_timeout(5)
    .run()
    .await
}
