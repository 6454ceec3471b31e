//! Exercises the operator audit trail (`ushadow_cli::audit::record`)
//! against a real log file.

use std::fs;
use std::path::PathBuf;

use ushadow_cli::audit;

fn tempdir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ushadow_cli_audit_test_{}_{}", label, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn record_appends_one_json_line_per_call() {
    let dir = tempdir("append");
    let log_path = dir.join("audit.log");

    audit::record(&log_path, "deploy", "chronicle", true, None);
    audit::record(&log_path, "undeploy", "chronicle", false, Some("active wiring".into()));

    let contents = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"action\":\"deploy\""));
    assert!(lines[0].contains("\"ok\":true"));
    assert!(lines[1].contains("\"detail\":\"active wiring\""));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn record_creates_missing_parent_directories() {
    let dir = tempdir("missing-parents");
    let log_path = dir.join("nested").join("audit.log");
    assert!(!log_path.parent().unwrap().exists());

    audit::record(&log_path, "deploy", "chronicle", true, None);
    assert!(log_path.exists());

    fs::remove_dir_all(&dir).ok();
}
