use rand::Rng;
use regex::Regex;

use super::{ErrorKind, Result};

/// A template/instance id must be a lowercase slug: alphanumerics and
/// dashes, 1-63 characters, matching the container/label-name conventions
/// used throughout the deployment backends.
pub fn validate_slug(id: &str) -> Result<()> {
    let re = Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").unwrap();
    if !re.is_match(id) {
        bail!(ErrorKind::InvalidSlug(id.to_string()));
    }
    Ok(())
}

/// An 8-character random id for deployment records, matching the scale of
/// `ushadow.deployment_id` container labels.
pub fn short_id() -> String {
    let mut rng = rand::thread_rng();
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    (0..8).map(|_| CHARS[rng.gen_range(0, CHARS.len())] as char).collect()
}

/// A longer opaque random string, used for join tokens and node secrets.
pub fn opaque_token() -> String {
    let mut rng = rand::thread_rng();
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    (0..40).map(|_| CHARS[rng.gen_range(0, CHARS.len())] as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_slugs() {
        assert!(validate_slug("chronicle").is_ok());
        assert!(validate_slug("chron-1").is_ok());
        assert!(validate_slug("a").is_ok());
    }

    #[test]
    fn invalid_slugs() {
        assert!(validate_slug("Chronicle").is_err());
        assert!(validate_slug("-leading-dash").is_err());
        assert!(validate_slug("trailing-dash-").is_err());
        assert!(validate_slug("has space").is_err());
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn short_id_is_eight_chars() {
        assert_eq!(short_id().len(), 8);
    }
}
