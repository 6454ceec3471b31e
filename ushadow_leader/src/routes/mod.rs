pub mod instances;
pub mod kubernetes;
pub mod nodes;
pub mod templates;
pub mod wiring;

use actix_web::web;

/// Mounts every resource group under `/api/v1`, mirroring the REST surface
/// spec.md 6 lays out: templates are read-only, instances/wiring are the
/// user's persistent configuration, nodes is the fleet, kubernetes is the
/// cluster registry.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/templates").route(web::get().to(templates::list)))
            .service(web::resource("/templates/reload").route(web::post().to(templates::reload)))
            .service(web::resource("/templates/{id}").route(web::get().to(templates::get)))
            .service(
                web::resource("/instances")
                    .route(web::get().to(instances::list))
                    .route(web::post().to(instances::create)),
            )
            .service(
                web::resource("/instances/{id}")
                    .route(web::get().to(instances::get))
                    .route(web::patch().to(instances::update))
                    .route(web::delete().to(instances::delete)),
            )
            .service(web::resource("/instances/{id}/deploy").route(web::post().to(instances::deploy)))
            .service(web::resource("/deployments/{id}/logs").route(web::get().to(instances::logs)))
            .service(
                web::resource("/wiring")
                    .route(web::get().to(wiring::list))
                    .route(web::post().to(wiring::create)),
            )
            .service(web::resource("/wiring/{id}").route(web::delete().to(wiring::delete)))
            .service(web::resource("/wiring/defaults").route(web::get().to(wiring::get_defaults)))
            .service(web::resource("/wiring/defaults/{capability}").route(web::put().to(wiring::set_default)))
            .service(web::resource("/nodes").route(web::get().to(nodes::list)))
            .service(web::resource("/nodes/{id}").route(web::get().to(nodes::get)).route(web::delete().to(nodes::remove)))
            .service(web::resource("/nodes/join-token").route(web::post().to(nodes::create_token)))
            .service(web::resource("/nodes/register").route(web::post().to(nodes::register)))
            .service(web::resource("/nodes/{id}/heartbeat").route(web::post().to(nodes::heartbeat)))
            .service(web::resource("/nodes/{id}/claim").route(web::post().to(nodes::claim)))
            .service(web::resource("/nodes/{id}/release").route(web::post().to(nodes::release)))
            .service(web::resource("/nodes/discover").route(web::post().to(nodes::discover_peers)))
            .service(web::resource("/leader-info").route(web::get().to(nodes::leader_info)))
            .service(
                web::resource("/kubernetes/clusters")
                    .route(web::get().to(kubernetes::list))
                    .route(web::post().to(kubernetes::register)),
            )
            .service(
                web::resource("/kubernetes/clusters/{id}")
                    .route(web::get().to(kubernetes::get))
                    .route(web::delete().to(kubernetes::remove)),
            )
            .service(web::resource("/kubernetes/clusters/{id}/scan").route(web::post().to(kubernetes::scan_infra))),
    );
}
