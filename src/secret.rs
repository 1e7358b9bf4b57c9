// MIT License - Copyright (c) 2026 Peter Wright
// Encryption at rest for stored credentials

use std::path::Path;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use tracing::info;

use crate::error::{BridgeError, Result};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Symmetric cipher used to keep the cloud password out of the config file
/// in clear text.
///
/// Sealed values are `hex(nonce || ciphertext || tag)`.
#[derive(Clone)]
pub struct PasswordCipher {
    key: [u8; KEY_LEN],
}

impl PasswordCipher {
    /// Create a cipher from raw key material.
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Load the hex-encoded key from `path`, generating and writing a fresh
    /// random key when the file does not exist yet.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            let text = std::fs::read_to_string(path)?;
            let bytes = hex::decode(text.trim()).map_err(|e| BridgeError::Crypto {
                reason: format!("invalid key file {}: {e}", path.display()),
            })?;
            let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| BridgeError::Crypto {
                reason: format!("key file {} must hold {KEY_LEN} bytes", path.display()),
            })?;
            return Ok(Self::from_key(key));
        }

        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, hex::encode(key))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        info!("Generated new encryption key at {}", path.display());
        Ok(Self::from_key(key))
    }

    /// Encrypt a secret. The empty string stays empty.
    pub fn encrypt(&self, clear: &str) -> Result<String> {
        if clear.is_empty() {
            return Ok(String::new());
        }
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let sealed = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), clear.as_bytes())
            .map_err(|_| BridgeError::Crypto { reason: "encryption failed".to_string() })?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(hex::encode(out))
    }

    /// Decrypt a value produced by [`PasswordCipher::encrypt`].
    pub fn decrypt(&self, sealed: &str) -> Result<String> {
        if sealed.is_empty() {
            return Ok(String::new());
        }
        let bytes = hex::decode(sealed).map_err(|_| BridgeError::Crypto {
            reason: "sealed value is not hex".to_string(),
        })?;
        if bytes.len() <= NONCE_LEN {
            return Err(BridgeError::Crypto { reason: "sealed value too short".to_string() });
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let clear = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| BridgeError::Crypto { reason: "authentication failed".to_string() })?;
        String::from_utf8(clear).map_err(|_| BridgeError::Crypto {
            reason: "decrypted value is not UTF-8".to_string(),
        })
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
    }
}

impl std::fmt::Debug for PasswordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCipher").finish_non_exhaustive()
    }
}
