use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use ushadow_definitions::Result;

/// One line of the audit log: who ran what, against which resource, and
/// whether it succeeded. Kept deliberately small — this is an operator
/// trail, not a replacement for the `Deployment`/`Instance` records
/// themselves.
#[derive(Serialize, Clone, Debug)]
struct AuditEntry<'a> {
    timestamp: String,
    actor: String,
    action: &'a str,
    resource: &'a str,
    ok: bool,
    detail: Option<String>,
}

/// Appends one entry to `<data_dir>/audit.log`. Never fails the calling
/// command if the log itself can't be written — logs a warning and moves
/// on, since a missing audit line is far less costly than aborting a
/// deploy/delete that already happened.
pub fn record(log_path: &Path, action: &str, resource: &str, ok: bool, detail: Option<String>) {
    let entry = AuditEntry {
        timestamp: Utc::now().to_rfc3339(),
        actor: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
        action,
        resource,
        ok,
        detail,
    };
    if let Err(e) = append(log_path, &entry) {
        warn!("could not write audit log entry: {}", e);
    }
}

fn append(log_path: &Path, entry: &AuditEntry) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(log_path)?;
    let line = serde_json::to_string(entry)?;
    writeln!(f, "{}", line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_a_line() {
        let dir = tempdir();
        let log_path = dir.join("audit.log");
        record(&log_path, "deploy", "chronicle", true, None);
        record(&log_path, "delete", "chronicle", false, Some("active deployments".into()));
        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"action\":\"deploy\""));
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("ushadow_audit_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
