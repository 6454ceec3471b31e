//! Exercises `CliContext::load` against real data directories, the same
//! "spin up real state, drive it through the public surface" style the
//! teacher's own integration tests used.

use std::fs;
use std::path::PathBuf;

use ushadow_cli::context::CliContext;

fn data_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ushadow-cli-context-test-{}-{}", label, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn loads_cleanly_against_an_empty_data_dir() {
    let dir = data_dir("empty");
    let ctx = CliContext::load(dir.clone()).expect("a fresh, empty data dir loads without error");
    assert!(ctx.templates.list().is_empty());
    assert!(ctx.instances.list().is_empty());
    assert!(ctx.wiring.list().is_empty());
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn discovers_a_compose_template_dropped_into_the_data_dir() {
    let dir = data_dir("compose-template");
    let compose_dir = dir.join("compose");
    fs::create_dir_all(&compose_dir).unwrap();
    fs::write(
        compose_dir.join("redis.yml"),
        r#"
services:
  cache:
    image: redis:7
    labels:
      ushadow.display_name: "Redis Cache"
"#,
    )
    .unwrap();

    let ctx = CliContext::load(dir.clone()).expect("data dir with a compose fixture loads");
    let tpl = ctx.templates.get("redis-cache").expect("compose service discovered as a template");
    assert_eq!(tpl.display_name, "Redis Cache");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn audit_log_path_is_scoped_to_the_data_dir() {
    let dir = data_dir("audit-path");
    let ctx = CliContext::load(dir.clone()).unwrap();
    assert_eq!(ctx.audit_log_path(), dir.join("audit.log"));
    fs::remove_dir_all(&dir).ok();
}
