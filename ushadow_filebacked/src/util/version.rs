use semver::Version;

use ushadow_definitions::{ErrorKind, Result};

/// Refuses to load a store whose `schema_version` is newer than this
/// binary's own `CARGO_PKG_VERSION` — a file written by a newer `ushadowd`
/// may use fields or semantics this build doesn't understand. Absent
/// entirely (an older file predating the field), there's nothing to check.
pub fn verify_schema_version(file: &str, declared: &Option<Version>) -> Result<()> {
    let declared = match declared {
        Some(v) => v,
        None => return Ok(()),
    };
    let current = Version::parse(env!("CARGO_PKG_VERSION")).unwrap();
    if declared > &current {
        return Err(ErrorKind::UnsupportedSchemaVersion(file.to_string(), declared.to_string(), current.to_string()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn older_or_equal_schema_version_is_accepted() {
        let current = Version::parse(env!("CARGO_PKG_VERSION")).unwrap();
        assert!(verify_schema_version("instances.yaml", &Some(current)).is_ok());
        assert!(verify_schema_version("instances.yaml", &None).is_ok());
    }

    #[test]
    fn newer_schema_version_is_rejected() {
        let mut future = Version::parse(env!("CARGO_PKG_VERSION")).unwrap();
        future.major += 1;
        assert!(verify_schema_version("instances.yaml", &Some(future)).is_err());
    }
}
