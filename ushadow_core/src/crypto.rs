use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use ushadow_definitions::{ErrorKind, Result};

/// Symmetric encryption for values that must not sit on disk in the
/// clear: per-node join secrets and kubeconfig payloads at rest
/// (spec.md 4.5/5). The key is derived as SHA-256 of the leader's own
/// application auth secret, so no separate key material needs managing.
pub struct SecretBox {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl SecretBox {
    pub fn from_passphrase(passphrase: &str) -> Result<Self> {
        let digest = Sha256::digest(passphrase.as_bytes());
        let unbound = UnboundKey::new(&AES_256_GCM, &digest)
            .map_err(|_| ErrorKind::BackendError("failed to build encryption key".into()))?;
        Ok(SecretBox { key: LessSafeKey::new(unbound), rng: SystemRandom::new() })
    }

    /// Encrypts `plaintext`, returning `nonce || ciphertext || tag` encoded
    /// as base64, suitable for storing directly as a string field.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| ErrorKind::BackendError("failed to generate nonce".into()))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| ErrorKind::BackendError("encryption failed".into()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&in_out);
        Ok(base64::encode(combined))
    }

    /// Inverse of [`seal`](Self::seal).
    pub fn open(&self, sealed: &str) -> Result<String> {
        let combined = base64::decode(sealed).map_err(|e| ErrorKind::BackendError(format!("invalid ciphertext encoding: {}", e)))?;
        if combined.len() < NONCE_LEN {
            return Err(ErrorKind::BackendError("ciphertext too short".into()).into());
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let mut nonce_arr = [0u8; NONCE_LEN];
        nonce_arr.copy_from_slice(nonce_bytes);
        let nonce = Nonce::assume_unique_for_key(nonce_arr);

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| ErrorKind::BackendError("decryption failed: wrong key or corrupted data".into()))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| ErrorKind::BackendError("decrypted payload is not valid UTF-8".into()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_roundtrips() {
        let secretbox = SecretBox::from_passphrase("leader-auth-secret").unwrap();
        let sealed = secretbox.seal("super secret kubeconfig contents").unwrap();
        assert_ne!(sealed, "super secret kubeconfig contents");
        let opened = secretbox.open(&sealed).unwrap();
        assert_eq!(opened, "super secret kubeconfig contents");
    }

    #[test]
    fn wrong_passphrase_fails_to_open() {
        let sealed = SecretBox::from_passphrase("correct-secret").unwrap().seal("payload").unwrap();
        let wrong = SecretBox::from_passphrase("wrong-secret").unwrap();
        assert!(wrong.open(&sealed).is_err());
    }
}
