//! Encrypted API key storage for TMarks.
//!
//! Provider API keys and the TMarks API key are sealed with AES-256-GCM
//! (`ring`) and kept in the `credentials` table. The sealing key is derived
//! with PBKDF2 from a random per-install secret stored next to the database
//! (`vault.key`, owner-only on Unix), so the database alone does not reveal
//! the keys. The derived key is wiped from memory when the vault is dropped.

use std::fs;
use std::io::Write;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use rusqlite::{params, OptionalExtension};
use tracing::info;
use zeroize::{Zeroize, Zeroizing};

use crate::database::Database;
use crate::types::ai::ProviderKind;
use crate::types::errors::{StoreError, VaultError};

/// File name of the per-install secret, placed beside the database.
pub const INSTALL_SECRET_FILE: &str = "vault.key";
/// Length of the per-install secret in bytes.
pub const INSTALL_SECRET_LENGTH: usize = 32;

const VAULT_SALT: &[u8] = b"tmarks-vault-salt";
const PBKDF2_ITERATIONS: u32 = 100_000;
const KEY_LENGTH: usize = 32;
const TAG_LENGTH: usize = 16;

/// Credential id of the TMarks API key.
pub const TMARKS_KEY_ID: &str = "tmarks_api_key";

/// Credential id of an AI provider key.
pub fn ai_key_id(kind: ProviderKind) -> String {
    format!("ai_key_{}", kind.as_str())
}

fn random_secret(rng: &SystemRandom) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let mut secret = Zeroizing::new(vec![0u8; INSTALL_SECRET_LENGTH]);
    rng.fill(&mut secret)
        .map_err(|_| VaultError::KeyDerivation("Failed to generate install secret".to_string()))?;
    Ok(secret)
}

fn write_new_secret(path: &Path, secret: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(secret)?;
    file.sync_all()
}

/// Reads the per-install secret at `path`, creating it on first use.
///
/// # Errors
/// Returns `VaultError::KeyDerivation` if the file cannot be read or written,
/// or holds a secret of the wrong length.
pub fn load_or_create_install_secret(path: &Path) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    if path.exists() {
        let secret = Zeroizing::new(fs::read(path).map_err(|e| {
            VaultError::KeyDerivation(format!("Failed to read {}: {}", path.display(), e))
        })?);
        if secret.len() != INSTALL_SECRET_LENGTH {
            return Err(VaultError::KeyDerivation(format!(
                "Install secret {} must be {} bytes, got {}",
                path.display(),
                INSTALL_SECRET_LENGTH,
                secret.len()
            )));
        }
        return Ok(secret);
    }

    let secret = random_secret(&SystemRandom::new())?;
    write_new_secret(path, &secret)
        .map_err(|e| VaultError::KeyDerivation(format!("Failed to write {}: {}", path.display(), e)))?;
    info!(path = %path.display(), "created key vault install secret");
    Ok(secret)
}

/// Sealed secret as stored in the `credentials` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SealedSecret {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub auth_tag: Vec<u8>,
}

/// Encrypted key-value store for API keys.
pub struct KeyVault {
    db: Arc<Database>,
    key: Zeroizing<Vec<u8>>,
    rng: SystemRandom,
}

impl KeyVault {
    /// Creates a vault whose sealing key is derived from `install_secret`.
    pub fn new(db: Arc<Database>, install_secret: &[u8]) -> Result<Self, VaultError> {
        if install_secret.is_empty() {
            return Err(VaultError::KeyDerivation("Install secret is empty".to_string()));
        }
        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS)
            .ok_or_else(|| VaultError::KeyDerivation("Invalid iteration count".to_string()))?;
        let mut key = Zeroizing::new(vec![0u8; KEY_LENGTH]);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            VAULT_SALT,
            install_secret,
            &mut key,
        );
        Ok(Self {
            db,
            key,
            rng: SystemRandom::new(),
        })
    }

    /// Creates a vault keyed by the install secret at `secret_path`.
    pub fn open_with_secret_file(db: Arc<Database>, secret_path: &Path) -> Result<Self, VaultError> {
        let secret = load_or_create_install_secret(secret_path)?;
        Self::new(db, &secret)
    }

    /// Creates a vault keyed by a fresh random secret that is never written
    /// anywhere. Keys it seals are readable only through this instance.
    pub fn ephemeral(db: Arc<Database>) -> Result<Self, VaultError> {
        let secret = random_secret(&SystemRandom::new())?;
        Self::new(db, &secret)
    }

    fn cipher(&self) -> Result<LessSafeKey, ring::error::Unspecified> {
        UnboundKey::new(&AES_256_GCM, &self.key).map(LessSafeKey::new)
    }

    /// Seals `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedSecret, VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| VaultError::Encryption("Failed to generate nonce".to_string()))?;
        let cipher = self
            .cipher()
            .map_err(|_| VaultError::Encryption("Failed to create encryption key".to_string()))?;

        let mut in_out = plaintext.to_vec();
        let tag = cipher
            .seal_in_place_separate_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
            .map_err(|_| VaultError::Encryption("Encryption operation failed".to_string()))?;

        Ok(SealedSecret {
            ciphertext: in_out,
            iv: nonce.to_vec(),
            auth_tag: tag.as_ref().to_vec(),
        })
    }

    pub fn open(&self, sealed: &SealedSecret) -> Result<Vec<u8>, VaultError> {
        let nonce: [u8; NONCE_LEN] = sealed.iv.as_slice().try_into().map_err(|_| {
            VaultError::Decryption(format!("IV must be {} bytes, got {}", NONCE_LEN, sealed.iv.len()))
        })?;
        if sealed.auth_tag.len() != TAG_LENGTH {
            return Err(VaultError::Decryption(format!(
                "Auth tag must be {} bytes, got {}",
                TAG_LENGTH,
                sealed.auth_tag.len()
            )));
        }
        let cipher = self
            .cipher()
            .map_err(|_| VaultError::Decryption("Failed to create decryption key".to_string()))?;

        let mut in_out = Vec::with_capacity(sealed.ciphertext.len() + TAG_LENGTH);
        in_out.extend_from_slice(&sealed.ciphertext);
        in_out.extend_from_slice(&sealed.auth_tag);
        let plaintext = cipher
            .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
            .map_err(|_| VaultError::Decryption("Authentication failed".to_string()))?
            .to_vec();
        in_out.zeroize();
        Ok(plaintext)
    }

    /// Stores `secret` under `id`, replacing any previous value.
    pub fn store(&self, id: &str, secret: &str) -> Result<(), VaultError> {
        let sealed = self.seal(secret.as_bytes())?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.db
            .connection()
            .execute(
                "INSERT OR REPLACE INTO credentials (id, ciphertext, iv, auth_tag, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, sealed.ciphertext, sealed.iv, sealed.auth_tag, now],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<Option<String>, VaultError> {
        let sealed = self
            .db
            .connection()
            .query_row(
                "SELECT ciphertext, iv, auth_tag FROM credentials WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SealedSecret {
                        ciphertext: row.get(0)?,
                        iv: row.get(1)?,
                        auth_tag: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)?;

        match sealed {
            Some(sealed) => {
                let bytes = self.open(&sealed)?;
                let secret = String::from_utf8(bytes)
                    .map_err(|e| VaultError::Decryption(e.to_string()))?;
                Ok(Some(secret))
            }
            None => Ok(None),
        }
    }

    /// Returns whether a value was removed.
    pub fn remove(&self, id: &str) -> Result<bool, VaultError> {
        let affected = self
            .db
            .connection()
            .execute("DELETE FROM credentials WHERE id = ?1", params![id])
            .map_err(StoreError::from)?;
        Ok(affected > 0)
    }

    /// Stores an AI provider key; an empty key removes it.
    pub fn set_ai_key(&self, kind: ProviderKind, api_key: &str) -> Result<(), VaultError> {
        let id = ai_key_id(kind);
        if api_key.trim().is_empty() {
            self.remove(&id)?;
            return Ok(());
        }
        self.store(&id, api_key.trim())
    }

    pub fn ai_key(&self, kind: ProviderKind) -> Result<Option<String>, VaultError> {
        self.load(&ai_key_id(kind))
    }

    /// Stores the TMarks API key; an empty key removes it.
    pub fn set_tmarks_key(&self, api_key: &str) -> Result<(), VaultError> {
        if api_key.trim().is_empty() {
            self.remove(TMARKS_KEY_ID)?;
            return Ok(());
        }
        self.store(TMARKS_KEY_ID, api_key.trim())
    }

    pub fn tmarks_key(&self) -> Result<Option<String>, VaultError> {
        self.load(TMARKS_KEY_ID)
    }
}
