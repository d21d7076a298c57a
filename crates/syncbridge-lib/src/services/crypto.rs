// Credential Vault
// AES-256-GCM encryption of stored secrets, keyed by an externally supplied secret

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use thiserror::Error;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
// Application-specific salt for key derivation
const APP_SALT: &[u8] = b"SyncBridge-Credential-Vault-v1";

/// Environment variable holding the vault secret
pub const VAULT_KEY_ENV: &str = "SYNCBRIDGE_VAULT_KEY";

/// Encrypted data structure stored alongside integrations and webhooks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Base64 encoded nonce
    pub nonce: String,
    /// Base64 encoded ciphertext
    pub ciphertext: String,
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Vault key is not configured (set SYNCBRIDGE_VAULT_KEY)")]
    MissingKey,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl CryptoError {
    pub fn code(&self) -> &'static str {
        match self {
            CryptoError::MissingKey => "VAULT_MISSING_KEY",
            CryptoError::Encryption(_) => "VAULT_ENCRYPTION_ERROR",
            CryptoError::Decryption(_) => "VAULT_DECRYPTION_ERROR",
            CryptoError::InvalidData(_) => "VAULT_INVALID_DATA",
        }
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Symmetric vault for credentials and webhook secrets
#[derive(Clone)]
pub struct CredentialVault {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Build a vault from secret material. Blank secrets are rejected so a
    /// restart can never silently switch to a different key.
    pub fn new(secret: &str) -> CryptoResult<Self> {
        if secret.trim().is_empty() {
            return Err(CryptoError::MissingKey);
        }
        Ok(Self {
            key: derive_key(secret),
        })
    }

    /// Build a vault from `SYNCBRIDGE_VAULT_KEY`
    pub fn from_env() -> CryptoResult<Self> {
        let secret = std::env::var(VAULT_KEY_ENV).map_err(|_| CryptoError::MissingKey)?;
        Self::new(&secret)
    }

    /// Encrypt a plaintext string with a fresh random nonce
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<EncryptedData> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::Encryption(format!("Failed to create cipher: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CryptoError::Encryption(format!("Encryption failed: {}", e)))?;

        Ok(EncryptedData {
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    /// Decrypt an encrypted data structure
    pub fn decrypt(&self, encrypted: &EncryptedData) -> CryptoResult<String> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CryptoError::Decryption(format!("Failed to create cipher: {}", e)))?;

        let nonce_bytes = BASE64
            .decode(&encrypted.nonce)
            .map_err(|e| CryptoError::InvalidData(format!("Invalid nonce: {}", e)))?;

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidData(format!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce_bytes.len()
            )));
        }

        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = BASE64
            .decode(&encrypted.ciphertext)
            .map_err(|e| CryptoError::InvalidData(format!("Invalid ciphertext: {}", e)))?;

        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|e| CryptoError::Decryption(format!("Decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::Decryption(format!("Invalid UTF-8: {}", e)))
    }

    /// Encrypt a JSON credential object
    pub fn encrypt_json(&self, value: &serde_json::Value) -> CryptoResult<EncryptedData> {
        let plaintext = serde_json::to_string(value)
            .map_err(|e| CryptoError::Encryption(format!("Failed to serialize: {}", e)))?;
        self.encrypt(&plaintext)
    }

    /// Decrypt a JSON credential object
    pub fn decrypt_json(&self, encrypted: &EncryptedData) -> CryptoResult<serde_json::Value> {
        let plaintext = self.decrypt(encrypted)?;
        serde_json::from_str(&plaintext)
            .map_err(|e| CryptoError::InvalidData(format!("Credentials are not JSON: {}", e)))
    }
}

/// Derive encryption key from the vault secret using SHA-256
fn derive_key(secret: &str) -> [u8; KEY_SIZE] {
    let mut hasher = sha2::Sha256::new();
    hasher.update(APP_SALT);
    hasher.update(secret.as_bytes());
    hasher.update(APP_SALT);

    let result = hasher.finalize();

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&result);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let vault = CredentialVault::new("unit-test-key").unwrap();
        let plaintext = "my-secret-api-token-12345";

        let encrypted = vault.encrypt(plaintext).expect("Encryption should succeed");
        let decrypted = vault.decrypt(&encrypted).expect("Decryption should succeed");

        assert_eq!(plaintext, decrypted);
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let vault = CredentialVault::new("unit-test-key").unwrap();
        let a = vault.encrypt("same").unwrap();
        let b = vault.encrypt("same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = CredentialVault::new("key-one").unwrap().encrypt("secret").unwrap();
        let result = CredentialVault::new("key-two").unwrap().decrypt(&encrypted);
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_blank_key_rejected() {
        assert!(matches!(CredentialVault::new("  "), Err(CryptoError::MissingKey)));
    }

    #[test]
    fn test_tampered_nonce_rejected() {
        let vault = CredentialVault::new("unit-test-key").unwrap();
        let mut encrypted = vault.encrypt("secret").unwrap();
        encrypted.nonce = BASE64.encode([0u8; 4]);
        assert!(matches!(vault.decrypt(&encrypted), Err(CryptoError::InvalidData(_))));
    }

    #[test]
    fn test_json_credentials() {
        let vault = CredentialVault::new("unit-test-key").unwrap();
        let creds = serde_json::json!({ "token": "abc", "username": "bot" });
        let encrypted = vault.encrypt_json(&creds).unwrap();
        assert_eq!(vault.decrypt_json(&encrypted).unwrap(), creds);
    }
}
