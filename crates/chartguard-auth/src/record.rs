//! The on-disk credential record
//!
//! One JSON document per installation:
//! ```json
//! {
//!   "version": 1,
//!   "user_id": "6f1c…",
//!   "kdf": { "algorithm": "argon2id", "salt": "<b64>",
//!            "params": { "memory_kib": 65536, "iterations": 3, "parallelism": 2 } },
//!   "user": { "username": "aled1027" },
//!   "wrapped_dek": { "algorithm": "aes-256-gcm", "nonce": "<b64>", "ciphertext": "<b64>", "tag": null },
//!   "created_at": "2026-01-01T00:00:00Z",
//!   "last_password_change": "2026-01-01T00:00:00Z"
//! }
//! ```
//!
//! There is no password hash. The password is correct exactly when the KEK
//! it derives can unwrap `wrapped_dek`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chartguard_core::UserInfo;
use chartguard_crypto::{encoding, KdfParams, WrappedDek, MIN_SALT_SIZE, NONCE_SIZE, TAG_SIZE};

use crate::error::{AuthError, AuthResult};

/// Schema version written by this build. Readers reject anything else.
pub const RECORD_VERSION: u32 = 1;

pub const KDF_ALGORITHM: &str = "argon2id";

pub const WRAP_ALGORITHM: &str = "aes-256-gcm";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub version: u32,
    /// UUID v4, generated at registration and never reused
    pub user_id: String,
    pub kdf: KdfSection,
    /// Informational only, never key material
    #[serde(alias = "display_user")]
    pub user: DisplayUser,
    pub wrapped_dek: WrappedDekSection,
    pub created_at: DateTime<Utc>,
    pub last_password_change: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdfSection {
    pub algorithm: String,
    /// base64
    pub salt: String,
    pub params: KdfParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayUser {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrappedDekSection {
    pub algorithm: String,
    /// base64, 12 bytes
    pub nonce: String,
    /// base64; includes the GCM tag unless `tag` is set
    pub ciphertext: String,
    /// base64, 16 bytes. Older writers may store the tag separately.
    #[serde(default)]
    pub tag: Option<String>,
}

impl WrappedDekSection {
    fn from_wrapped(wrapped: &WrappedDek) -> Self {
        Self {
            algorithm: WRAP_ALGORITHM.into(),
            nonce: encoding::encode(&wrapped.nonce),
            ciphertext: encoding::encode(&wrapped.ciphertext),
            tag: None,
        }
    }
}

impl CredentialRecord {
    /// Assemble a fresh record at registration.
    pub fn new(
        username: &str,
        salt: &[u8],
        params: KdfParams,
        wrapped: &WrappedDek,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            version: RECORD_VERSION,
            user_id: uuid::Uuid::new_v4().to_string(),
            kdf: KdfSection {
                algorithm: KDF_ALGORITHM.into(),
                salt: encoding::encode(salt),
                params,
            },
            user: DisplayUser {
                username: username.to_string(),
            },
            wrapped_dek: WrappedDekSection::from_wrapped(wrapped),
            created_at: now,
            last_password_change: now,
        }
    }

    /// The same record after a password change: new salt, params and
    /// wrapped DEK. Identity and creation time are preserved.
    pub fn rewrapped(
        &self,
        salt: &[u8],
        params: KdfParams,
        wrapped: &WrappedDek,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kdf: KdfSection {
                algorithm: KDF_ALGORITHM.into(),
                salt: encoding::encode(salt),
                params,
            },
            wrapped_dek: WrappedDekSection::from_wrapped(wrapped),
            last_password_change: now,
            ..self.clone()
        }
    }

    /// Structural and semantic checks. Everything that fails here is
    /// [`AuthError::RecordCorrupt`]. KDF cost values are left to the KDF,
    /// which reports them as a configuration error.
    pub fn validate(&self) -> AuthResult<()> {
        if self.version != RECORD_VERSION {
            return Err(corrupt(format!(
                "unsupported record version {} (expected {RECORD_VERSION})",
                self.version
            )));
        }
        if self.user_id.trim().is_empty() {
            return Err(corrupt("empty user_id"));
        }
        if self.kdf.algorithm != KDF_ALGORITHM {
            return Err(corrupt(format!(
                "unsupported KDF algorithm {:?}",
                self.kdf.algorithm
            )));
        }
        if self.wrapped_dek.algorithm != WRAP_ALGORITHM {
            return Err(corrupt(format!(
                "unsupported key wrap algorithm {:?}",
                self.wrapped_dek.algorithm
            )));
        }
        self.salt()?;
        self.wrapped()?;
        Ok(())
    }

    /// Decoded salt, at least [`MIN_SALT_SIZE`] bytes.
    pub fn salt(&self) -> AuthResult<Vec<u8>> {
        let salt = decode_field("kdf.salt", &self.kdf.salt)?;
        if salt.len() < MIN_SALT_SIZE {
            return Err(corrupt(format!(
                "kdf.salt is {} bytes (minimum {MIN_SALT_SIZE})",
                salt.len()
            )));
        }
        Ok(salt)
    }

    /// Decoded wrapped DEK with any separately stored tag appended.
    pub fn wrapped(&self) -> AuthResult<WrappedDek> {
        let section = &self.wrapped_dek;

        let nonce_bytes = decode_field("wrapped_dek.nonce", &section.nonce)?;
        let nonce: [u8; NONCE_SIZE] = nonce_bytes.as_slice().try_into().map_err(|_| {
            corrupt(format!(
                "wrapped_dek.nonce is {} bytes (expected {NONCE_SIZE})",
                nonce_bytes.len()
            ))
        })?;

        let mut ciphertext = decode_field("wrapped_dek.ciphertext", &section.ciphertext)?;
        if let Some(tag) = &section.tag {
            let tag = decode_field("wrapped_dek.tag", tag)?;
            if tag.len() != TAG_SIZE {
                return Err(corrupt(format!(
                    "wrapped_dek.tag is {} bytes (expected {TAG_SIZE})",
                    tag.len()
                )));
            }
            ciphertext.extend_from_slice(&tag);
        }
        if ciphertext.len() != WrappedDek::CIPHERTEXT_LEN {
            return Err(corrupt(format!(
                "wrapped_dek ciphertext+tag is {} bytes (expected {})",
                ciphertext.len(),
                WrappedDek::CIPHERTEXT_LEN
            )));
        }

        Ok(WrappedDek { nonce, ciphertext })
    }

    pub fn user_info(&self) -> UserInfo {
        UserInfo {
            user_id: self.user_id.clone(),
            username: self.user.username.clone(),
        }
    }
}

fn decode_field(name: &str, value: &str) -> AuthResult<Vec<u8>> {
    encoding::decode(value).map_err(|e| corrupt(format!("{name} is not valid base64: {e}")))
}

fn corrupt(msg: impl Into<String>) -> AuthError {
    AuthError::RecordCorrupt(msg.into())
}
