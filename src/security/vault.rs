//! AES-256-GCM credential vault with key rotation.
//!
//! Backend API keys are held encrypted at rest in memory. Every ciphertext
//! records the id of the key that produced it, so rotation can introduce a new
//! active key while older ciphertexts stay decryptable.

use super::SecurityError;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Ciphertext plus everything needed to decrypt it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub key_id: String,
    /// Base64 nonce.
    pub nonce: String,
    /// Base64 ciphertext (with tag).
    pub ciphertext: String,
    pub encrypted_at: DateTime<Utc>,
}

/// Set of AES-256 keys with one active key used for new encryptions.
pub struct KeyRing {
    keys: HashMap<String, Key<Aes256Gcm>>,
    active: String,
    generation: u32,
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&String> = self.keys.keys().collect();
        ids.sort();
        f.debug_struct("KeyRing")
            .field("active", &self.active)
            .field("keys", &ids)
            .finish()
    }
}

impl KeyRing {
    /// Ring with a freshly generated key.
    pub fn generate() -> Self {
        let mut ring = Self {
            keys: HashMap::new(),
            active: String::new(),
            generation: 0,
        };
        ring.rotate();
        ring
    }

    /// Ring seeded from a base64-encoded 32-byte master key.
    pub fn from_base64(encoded: &str) -> Result<Self, SecurityError> {
        let bytes = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|e| SecurityError::InvalidKey(e.to_string()))?;
        if bytes.len() != KEY_LEN {
            return Err(SecurityError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }
        let id = "key-1".to_string();
        let key = *Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            keys: HashMap::from([(id.clone(), key)]),
            active: id,
            generation: 1,
        })
    }

    pub fn active_key_id(&self) -> &str {
        &self.active
    }

    pub fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Generate a new active key. Old keys are retained for decryption.
    pub fn rotate(&mut self) -> String {
        self.generation += 1;
        let id = format!("key-{}", self.generation);
        self.keys.insert(id.clone(), Aes256Gcm::generate_key(OsRng));
        self.active = id.clone();
        id
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, SecurityError> {
        let key = self
            .keys
            .get(&self.active)
            .ok_or_else(|| SecurityError::UnknownKey(self.active.clone()))?;
        let cipher = Aes256Gcm::new(key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| SecurityError::Encryption(e.to_string()))?;

        Ok(EncryptedSecret {
            key_id: self.active.clone(),
            nonce: BASE64_STANDARD.encode(nonce),
            ciphertext: BASE64_STANDARD.encode(ciphertext),
            encrypted_at: Utc::now(),
        })
    }

    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, SecurityError> {
        let key = self
            .keys
            .get(&secret.key_id)
            .ok_or_else(|| SecurityError::UnknownKey(secret.key_id.clone()))?;
        let nonce_bytes = BASE64_STANDARD
            .decode(&secret.nonce)
            .map_err(|e| SecurityError::Decryption(e.to_string()))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(SecurityError::Decryption("malformed nonce".to_string()));
        }
        let ciphertext = BASE64_STANDARD
            .decode(&secret.ciphertext)
            .map_err(|e| SecurityError::Decryption(e.to_string()))?;

        let plaintext = Aes256Gcm::new(key)
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| SecurityError::Decryption(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|e| SecurityError::Decryption(e.to_string()))
    }
}

/// Named credentials stored encrypted under a [`KeyRing`].
#[derive(Debug)]
pub struct CredentialVault {
    ring: RwLock<KeyRing>,
    secrets: DashMap<String, EncryptedSecret>,
}

impl CredentialVault {
    pub fn new(ring: KeyRing) -> Self {
        Self {
            ring: RwLock::new(ring),
            secrets: DashMap::new(),
        }
    }

    /// Vault with an ephemeral key that lives as long as the process.
    pub fn ephemeral() -> Self {
        Self::new(KeyRing::generate())
    }

    pub fn store(&self, name: &str, plaintext: &str) -> Result<(), SecurityError> {
        let secret = self
            .ring
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .encrypt(plaintext)?;
        self.secrets.insert(name.to_string(), secret);
        tracing::debug!(credential = %name, "Credential stored");
        Ok(())
    }

    /// Insert an already encrypted secret (e.g., loaded from disk).
    pub fn insert_encrypted(&self, name: &str, secret: EncryptedSecret) {
        self.secrets.insert(name.to_string(), secret);
    }

    pub fn get(&self, name: &str) -> Result<String, SecurityError> {
        let secret = self
            .secrets
            .get(name)
            .map(|s| s.clone())
            .ok_or_else(|| SecurityError::CredentialNotFound(name.to_string()))?;
        self.ring
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .decrypt(&secret)
    }

    pub fn encrypted(&self, name: &str) -> Option<EncryptedSecret> {
        self.secrets.get(name).map(|s| s.clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.secrets.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn active_key_id(&self) -> String {
        self.ring
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active_key_id()
            .to_string()
    }

    /// Generate a new active key and re-encrypt every stored credential with it.
    ///
    /// Returns the new key id. On failure no credential is changed.
    pub fn rotate(&self) -> Result<String, SecurityError> {
        let mut ring = self.ring.write().unwrap_or_else(PoisonError::into_inner);

        let plaintexts: Vec<(String, String)> = self
            .secrets
            .iter()
            .map(|entry| Ok((entry.key().clone(), ring.decrypt(entry.value())?)))
            .collect::<Result<_, SecurityError>>()?;

        let previous = ring.active_key_id().to_string();
        let new_id = ring.rotate();

        let reencrypted: Vec<(String, EncryptedSecret)> = plaintexts
            .iter()
            .map(|(name, plaintext)| Ok((name.clone(), ring.encrypt(plaintext)?)))
            .collect::<Result<_, SecurityError>>()?;
        for (name, secret) in reencrypted {
            self.secrets.insert(name, secret);
        }

        tracing::info!(
            previous_key = %previous,
            active_key = %new_id,
            credentials = plaintexts.len(),
            "Credential key rotated"
        );
        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let ring = KeyRing::generate();
        let secret = ring.encrypt("sk-live-123").unwrap();
        assert_eq!(secret.key_id, "key-1");
        assert_ne!(secret.ciphertext, "sk-live-123");
        assert_eq!(ring.decrypt(&secret).unwrap(), "sk-live-123");
    }

    #[test]
    fn test_nonce_differs_per_encryption() {
        let ring = KeyRing::generate();
        let a = ring.encrypt("same").unwrap();
        let b = ring.encrypt("same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let ring = KeyRing::generate();
        let mut secret = ring.encrypt("sk-live-123").unwrap();
        let mut bytes = BASE64_STANDARD.decode(&secret.ciphertext).unwrap();
        bytes[0] ^= 0xff;
        secret.ciphertext = BASE64_STANDARD.encode(bytes);
        assert!(matches!(
            ring.decrypt(&secret),
            Err(SecurityError::Decryption(_))
        ));
    }

    #[test]
    fn test_unknown_key_id() {
        let ring = KeyRing::generate();
        let mut secret = ring.encrypt("x").unwrap();
        secret.key_id = "key-99".to_string();
        assert_eq!(
            ring.decrypt(&secret),
            Err(SecurityError::UnknownKey("key-99".to_string()))
        );
    }

    #[test]
    fn test_old_keys_still_decrypt_after_rotation() {
        let mut ring = KeyRing::generate();
        let old = ring.encrypt("before").unwrap();
        let new_id = ring.rotate();
        assert_eq!(new_id, "key-2");
        assert_eq!(ring.key_ids(), vec!["key-1", "key-2"]);
        assert_eq!(ring.decrypt(&old).unwrap(), "before");
        assert_eq!(ring.encrypt("after").unwrap().key_id, "key-2");
    }

    #[test]
    fn test_from_base64_rejects_short_key() {
        let short = BASE64_STANDARD.encode([0u8; 16]);
        assert!(matches!(
            KeyRing::from_base64(&short),
            Err(SecurityError::InvalidKey(_))
        ));
        let ok = BASE64_STANDARD.encode([7u8; 32]);
        assert_eq!(KeyRing::from_base64(&ok).unwrap().active_key_id(), "key-1");
    }

    #[test]
    fn test_vault_rotation_reencrypts_credentials() {
        let vault = CredentialVault::ephemeral();
        vault.store("openai", "sk-openai").unwrap();
        vault.store("anthropic", "sk-ant").unwrap();

        let new_id = vault.rotate().unwrap();

        assert_eq!(vault.active_key_id(), new_id);
        assert_eq!(vault.encrypted("openai").unwrap().key_id, new_id);
        assert_eq!(vault.get("openai").unwrap(), "sk-openai");
        assert_eq!(vault.get("anthropic").unwrap(), "sk-ant");
        assert_eq!(vault.names(), vec!["anthropic", "openai"]);
    }

    #[test]
    fn test_vault_missing_credential() {
        let vault = CredentialVault::ephemeral();
        assert_eq!(
            vault.get("nope"),
            Err(SecurityError::CredentialNotFound("nope".to_string()))
        );
    }
}
