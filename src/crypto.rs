//! Reversible, user-scoped data transforms backing at-rest protection.
//!
//! On Windows the transform is DPAPI in current-user scope. Elsewhere a
//! per-user AES-256-GCM key is derived with Argon2id from a random secret
//! kept next to the data file, salted with the user and host identity.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Errors that can occur inside a protection backend.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid base64 encoding")]
    InvalidBase64,
    #[error("Key derivation failed")]
    KeyDerivationFailed,
    #[error("Key store error: {0}")]
    KeyStore(String),
}

/// A reversible transform bound to the current user (and machine).
pub trait DataProtector: Send + Sync {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Name of the secret file used by [`LocalKeyProtector`].
pub const KEY_FILE: &str = "protector.key";

const SECRET_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Argon2id cost parameters for the local key derivation.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    pub time_cost: u32,
    pub memory_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: 2,
            memory_cost: 65536, // 64 MB
            parallelism: 1,
        }
    }
}

/// AES-256-GCM protector keyed by a user-and-machine scoped derived key.
pub struct LocalKeyProtector {
    key: DerivedKey,
}

impl LocalKeyProtector {
    /// Open the key secret in `data_dir`, creating it on first use.
    pub fn open(data_dir: &Path) -> Result<Self, CryptoError> {
        let mut secret = load_or_create_secret(data_dir)?;
        let result = Self::from_secret(&secret, &scope_identity(), KdfParams::default());
        secret.zeroize();
        result
    }

    /// Derive the key from a secret and a scope string.
    pub fn from_secret(secret: &[u8], scope: &str, params: KdfParams) -> Result<Self, CryptoError> {
        let params = Params::new(
            params.memory_cost,
            params.time_cost,
            params.parallelism,
            Some(SECRET_LEN),
        )
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

        let mut output = vec![0u8; SECRET_LEN];
        argon2
            .hash_password_into(secret, scope.as_bytes(), &mut output)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;

        Ok(Self {
            key: DerivedKey(output),
        })
    }

    /// Use a raw 256-bit key directly.
    pub fn with_key(key: [u8; SECRET_LEN]) -> Self {
        Self {
            key: DerivedKey(key.to_vec()),
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key.0))
    }
}

impl DataProtector for LocalKeyProtector {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        // nonce || ciphertext (tag appended by AES-GCM)
        let mut combined = Vec::with_capacity(nonce.len() + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(combined)
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < NONCE_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// A derived key that automatically zeroes itself on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct DerivedKey(Vec<u8>);

fn load_or_create_secret(data_dir: &Path) -> Result<Vec<u8>, CryptoError> {
    let key_path = data_dir.join(KEY_FILE);

    if key_path.exists() {
        let secret = fs::read(&key_path).map_err(|e| CryptoError::KeyStore(e.to_string()))?;
        if secret.len() != SECRET_LEN {
            return Err(CryptoError::KeyStore(format!(
                "{} has an invalid size",
                key_path.display()
            )));
        }
        return Ok(secret);
    }

    fs::create_dir_all(data_dir).map_err(|e| CryptoError::KeyStore(e.to_string()))?;
    let mut secret = vec![0u8; SECRET_LEN];
    OsRng.fill_bytes(&mut secret);
    fs::write(&key_path, &secret).map_err(|e| CryptoError::KeyStore(e.to_string()))?;
    crate::utils::restrict_to_owner(&key_path);
    tracing::info!(path = %key_path.display(), "created protection key");

    Ok(secret)
}

/// Identity string binding derived keys to the current user and host.
pub fn scope_identity() -> String {
    let user = ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .unwrap_or_else(|| "user".to_string());
    format!("cmdkit:{}@{}", user, host_name())
}

#[cfg(unix)]
fn host_name() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(not(unix))]
fn host_name() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Windows Data Protection API in current-user scope.
#[cfg(windows)]
pub struct DpapiProtector;

#[cfg(windows)]
impl DpapiProtector {
    fn transform(data: &[u8], protect: bool) -> Result<Vec<u8>, CryptoError> {
        use std::ptr;
        use winapi::um::dpapi::{CryptProtectData, CryptUnprotectData};
        use winapi::um::wincrypt::CRYPTOAPI_BLOB;

        let mut input_blob = CRYPTOAPI_BLOB {
            cbData: data.len() as u32,
            pbData: data.as_ptr() as *mut u8,
        };
        let mut output_blob = CRYPTOAPI_BLOB {
            cbData: 0,
            pbData: ptr::null_mut(),
        };

        let result = unsafe {
            if protect {
                CryptProtectData(
                    &mut input_blob,
                    ptr::null(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    0,
                    &mut output_blob,
                )
            } else {
                CryptUnprotectData(
                    &mut input_blob,
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    0,
                    &mut output_blob,
                )
            }
        };

        if result == 0 {
            return Err(if protect {
                CryptoError::EncryptionFailed
            } else {
                CryptoError::DecryptionFailed
            });
        }

        let bytes = unsafe {
            std::slice::from_raw_parts(output_blob.pbData, output_blob.cbData as usize).to_vec()
        };
        unsafe {
            winapi::um::winbase::LocalFree(output_blob.pbData as *mut _);
        }
        Ok(bytes)
    }
}

#[cfg(windows)]
impl DataProtector for DpapiProtector {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Self::transform(plaintext, true)
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Self::transform(blob, false)
    }
}

/// Stand-in used when the platform backend cannot be opened. Every call
/// fails, so values pass through [`crate::protect::SecretProtector`] as is.
#[derive(Debug, Clone)]
pub struct UnavailableProtector {
    reason: String,
}

impl UnavailableProtector {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl DataProtector for UnavailableProtector {
    fn protect(&self, _plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Err(CryptoError::KeyStore(self.reason.clone()))
    }

    fn unprotect(&self, _blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Err(CryptoError::KeyStore(self.reason.clone()))
    }
}

/// The protector appropriate for this platform.
#[cfg(windows)]
pub fn platform_protector(_data_dir: &Path) -> Result<Arc<dyn DataProtector>, CryptoError> {
    Ok(Arc::new(DpapiProtector))
}

/// The protector appropriate for this platform.
#[cfg(not(windows))]
pub fn platform_protector(data_dir: &Path) -> Result<Arc<dyn DataProtector>, CryptoError> {
    Ok(Arc::new(LocalKeyProtector::open(data_dir)?))
}
