//! Drives `commands::instances` and `commands::wiring` through
//! `CliContext` against a real data directory.

use std::fs;
use std::path::PathBuf;

use ushadow_cli::commands::{instances, wiring};
use ushadow_cli::context::CliContext;
use ushadow_definitions::InstanceStatus;

fn data_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ushadow-cli-instances-test-{}-{}", label, std::process::id()));
    fs::create_dir_all(&dir.join("compose")).unwrap();
    dir
}

fn write_redis_template(dir: &std::path::Path) {
    fs::write(
        dir.join("compose").join("redis.yml"),
        r#"
services:
  cache:
    image: redis:7
    labels:
      ushadow.provides: "cache"
"#,
    )
    .unwrap();
}

#[test]
fn create_persists_an_instance_against_its_template() {
    let dir = data_dir("create");
    write_redis_template(&dir);
    let mut ctx = CliContext::load(dir.clone()).unwrap();

    instances::create(&mut ctx, "redis-1", "redis-cache", "My Redis").unwrap();

    let inst = ctx.instances.require("redis-1").unwrap();
    assert_eq!(inst.template_id, "redis-cache");
    assert_eq!(inst.display_name, "My Redis");
    assert_eq!(inst.status, InstanceStatus::Draft);

    // Reloading the store from disk should see the same instance.
    let reloaded = CliContext::load(dir.clone()).unwrap();
    assert!(reloaded.instances.get("redis-1").is_some());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn create_rejects_an_unknown_template() {
    let dir = data_dir("unknown-template");
    let mut ctx = CliContext::load(dir.clone()).unwrap();

    let err = instances::create(&mut ctx, "redis-1", "does-not-exist", "My Redis");
    assert!(err.is_err());
    assert!(ctx.instances.get("redis-1").is_none());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn delete_cascades_to_wiring_rows_referencing_the_instance() {
    let dir = data_dir("delete-cascade");
    write_redis_template(&dir);
    let mut ctx = CliContext::load(dir.clone()).unwrap();

    instances::create(&mut ctx, "redis-1", "redis-cache", "Redis").unwrap();
    instances::create(&mut ctx, "app-1", "redis-cache", "App").unwrap();
    wiring::create(&mut ctx, "w1", "redis-1", "cache", "app-1", "cache").unwrap();
    assert_eq!(ctx.wiring.list().len(), 1);

    instances::delete(&mut ctx, "redis-1").unwrap();
    assert!(ctx.wiring.list().is_empty());
    assert!(ctx.instances.get("redis-1").is_none());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn wiring_create_rejects_an_unknown_endpoint_instance() {
    let dir = data_dir("wiring-unknown-endpoint");
    write_redis_template(&dir);
    let mut ctx = CliContext::load(dir.clone()).unwrap();
    instances::create(&mut ctx, "app-1", "redis-cache", "App").unwrap();

    let err = wiring::create(&mut ctx, "w1", "does-not-exist", "cache", "app-1", "cache");
    assert!(err.is_err());
    assert!(ctx.wiring.list().is_empty());

    fs::remove_dir_all(&dir).ok();
}
