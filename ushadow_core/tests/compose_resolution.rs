//! Exercises `compose::resolve_service_definition` against real compose
//! files via the actual `docker compose config` subprocess (spec.md 4.4.1
//! "outsource variable substitution to the compose tool, never
//! reimplement it") — the round-trip and boundary-behavior properties from
//! spec.md 8 that don't require a running daemon.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use ushadow_core::deploy::compose::resolve_service_definition;
use ushadow_definitions::resolved::{EnvSource, ResolvedEnv};

fn write_compose(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

fn tempdir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ushadow-compose-resolution-test-{}-{}", label, std::process::id()));
    fs::create_dir_all(&dir).ok();
    dir
}

#[tokio::test]
async fn resolving_the_same_instance_twice_is_idempotent() {
    let dir = tempdir("idempotent");
    let compose_file = write_compose(
        &dir,
        "mem0.yml",
        r#"
services:
  mem0-ui:
    image: ghcr.io/example/mem0-ui:latest
    ports:
      - "3002:3000"
    environment:
      URL: "${API_BASE:-http://localhost:8080}"
"#,
    );

    let mut env = BTreeMap::new();
    env.insert("API_BASE".to_string(), ResolvedEnv::new("http://example.test", EnvSource::Settings));

    let first = resolve_service_definition("mem0-1", &compose_file, "mem0-ui", env.clone()).await.unwrap();
    let second = resolve_service_definition("mem0-1", &compose_file, "mem0-ui", env).await.unwrap();

    assert_eq!(first.image, second.image);
    assert_eq!(first.ports, second.ports);
    assert_eq!(first.env_as_plain_map(), second.env_as_plain_map());

    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn container_only_port_spec_binds_the_same_port_both_sides() {
    let dir = tempdir("container-only-port");
    let compose_file = write_compose(
        &dir,
        "redis.yml",
        r#"
services:
  cache:
    image: redis:7
    ports:
      - "6379"
"#,
    );

    let resolved = resolve_service_definition("redis-1", &compose_file, "cache", BTreeMap::new()).await.unwrap();
    assert_eq!(resolved.ports.len(), 1);
    assert_eq!(resolved.ports[0].container_port, 6379);
    assert_eq!(resolved.ports[0].host_port, Some(6379));

    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn host_colon_container_port_spec_keeps_both_distinct() {
    let dir = tempdir("host-container-port");
    let compose_file = write_compose(
        &dir,
        "web.yml",
        r#"
services:
  web:
    image: nginx:alpine
    ports:
      - "3002:3000"
"#,
    );

    let resolved = resolve_service_definition("web-1", &compose_file, "web", BTreeMap::new()).await.unwrap();
    assert_eq!(resolved.ports.len(), 1);
    assert_eq!(resolved.ports[0].container_port, 3000);
    assert_eq!(resolved.ports[0].host_port, Some(3002));

    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn health_check_labels_round_trip_into_resolved_fields() {
    let dir = tempdir("health-labels");
    let compose_file = write_compose(
        &dir,
        "chronicle.yml",
        r#"
services:
  chronicle:
    image: ghcr.io/example/chronicle:latest
    ports:
      - "8081:8080"
    labels:
      ushadow.health_check_path: "/healthz"
      ushadow.health_check_port: "8080"
"#,
    );

    let resolved = resolve_service_definition("chron-1", &compose_file, "chronicle", BTreeMap::new()).await.unwrap();
    assert_eq!(resolved.health_check_path.as_deref(), Some("/healthz"));
    assert_eq!(resolved.health_check_port, Some(8080));

    fs::remove_dir_all(&dir).ok();
}
