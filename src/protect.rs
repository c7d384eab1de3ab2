//! Tagged at-rest protection for entry values.
//!
//! A protected value is `__ENC__` followed by the base64 of the backend
//! transform of the UTF-8 plaintext. Whether a value is protected is read off
//! the prefix, never stored separately.

use crate::crypto::{CryptoError, DataProtector};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroize;

/// Marker prefix of protected values.
pub const PREFIX: &str = "__ENC__";

/// True if `value` is in protected form.
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(PREFIX)
}

/// Applies and removes value protection. Never fails past its boundary.
#[derive(Clone)]
pub struct SecretProtector {
    backend: Arc<dyn DataProtector>,
}

impl SecretProtector {
    pub fn new(backend: Arc<dyn DataProtector>) -> Self {
        Self { backend }
    }

    /// Protect `plain`. Empty input, or a backend failure, returns `plain` unchanged.
    pub fn protect(&self, plain: &str) -> String {
        if plain.is_empty() {
            return String::new();
        }
        match self.try_protect(plain) {
            Ok(protected) => protected,
            Err(e) => {
                warn!("protection failed, value kept as plaintext: {e}");
                plain.to_string()
            }
        }
    }

    pub fn try_protect(&self, plain: &str) -> Result<String, CryptoError> {
        let mut bytes = plain.as_bytes().to_vec();
        let blob = self.backend.protect(&bytes);
        bytes.zeroize();
        Ok(format!("{PREFIX}{}", STANDARD.encode(blob?)))
    }

    /// Decode `value`. Plaintext and undecodable blobs come back unchanged.
    pub fn unprotect(&self, value: &str) -> String {
        self.try_unprotect(value).unwrap_or_else(|e| {
            debug!("unprotect failed, returning value as stored: {e}");
            value.to_string()
        })
    }

    /// Decode `value`, reporting why a protected value could not be read.
    pub fn try_unprotect(&self, value: &str) -> Result<String, CryptoError> {
        let Some(encoded) = value.strip_prefix(PREFIX) else {
            return Ok(value.to_string());
        };
        let blob = STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::InvalidBase64)?;
        let bytes = self.backend.unprotect(&blob)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::LocalKeyProtector;

    pub(crate) fn test_protector() -> SecretProtector {
        SecretProtector::new(Arc::new(LocalKeyProtector::with_key([42u8; 32])))
    }

    /// Backend that always fails, standing in for an unavailable platform API.
    pub(crate) struct BrokenBackend;

    impl DataProtector for BrokenBackend {
        fn protect(&self, _: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Err(CryptoError::EncryptionFailed)
        }
        fn unprotect(&self, _: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Err(CryptoError::DecryptionFailed)
        }
    }

    #[test]
    fn test_round_trip() {
        let protector = test_protector();
        for plain in ["ghp_abc123", "multi\nline value", "ünïcødé 🔑"] {
            let protected = protector.protect(plain);
            assert!(is_encrypted(&protected));
            assert_eq!(protector.unprotect(&protected), plain);
        }
    }

    #[test]
    fn test_plaintext_passthrough() {
        let protector = test_protector();
        assert_eq!(protector.unprotect("kubectl get pods"), "kubectl get pods");
        assert_eq!(protector.unprotect(""), "");
        assert!(!is_encrypted("kubectl get pods"));
        assert!(!is_encrypted("_ENC__almost"));
    }

    #[test]
    fn test_empty_is_not_protected() {
        let protector = test_protector();
        assert_eq!(protector.protect(""), "");
    }

    #[test]
    fn test_failed_protect_keeps_plaintext() {
        let protector = SecretProtector::new(Arc::new(BrokenBackend));
        assert_eq!(protector.protect("hunter2"), "hunter2");
    }

    #[test]
    fn test_unavailable_backend_passes_values_through() {
        let protector = SecretProtector::new(Arc::new(
            crate::crypto::UnavailableProtector::new("no key"),
        ));
        assert_eq!(protector.protect("hunter2"), "hunter2");
        let blob = test_protector().protect("hunter2");
        assert_eq!(protector.unprotect(&blob), blob);
        assert_eq!(protector.unprotect("plain"), "plain");
    }

    #[test]
    fn test_corrupt_blob_returned_unchanged() {
        let protector = test_protector();
        let garbage = format!("{PREFIX}not base64!!");
        assert_eq!(protector.unprotect(&garbage), garbage);
        assert!(matches!(
            protector.try_unprotect(&garbage),
            Err(CryptoError::InvalidBase64)
        ));

        let foreign = SecretProtector::new(Arc::new(LocalKeyProtector::with_key([7u8; 32])))
            .protect("from another machine");
        assert_eq!(protector.unprotect(&foreign), foreign);
    }
}
