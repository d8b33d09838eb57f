//! Key derivation: Argon2id password → key-encryption key

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::{KEY_SIZE, MIN_SALT_SIZE, SALT_SIZE};

/// Upper bound on `memory_kib` (4 GiB). Anything larger is a corrupt or
/// hostile record, not a cost setting.
pub const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;

/// Argon2's lane limit (2^24 - 1).
pub const MAX_PARALLELISM: u32 = 0x00FF_FFFF;

/// A 256-bit key-encryption key derived from a password via Argon2id.
///
/// Only ever used to wrap or unwrap the DEK. Zeroized on drop.
pub struct Kek {
    bytes: [u8; KEY_SIZE],
}

impl Kek {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for Kek {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kek").field("bytes", &"[REDACTED]").finish()
    }
}

/// Argon2id cost parameters, persisted with every credential record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_kib: u32,
    /// Time cost / passes over memory (default: 3)
    pub iterations: u32,
    /// Lanes (default: 2)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 2,
        }
    }
}

impl KdfParams {
    /// Reject parameters that argon2 would refuse or that would derive a
    /// trivially weak key.
    pub fn validate(&self) -> CryptoResult<()> {
        self.to_argon2().map(|_| ())
    }

    fn to_argon2(&self) -> CryptoResult<Params> {
        if self.iterations == 0 {
            return Err(CryptoError::InvalidParams(
                "iterations must be at least 1".into(),
            ));
        }
        if self.parallelism == 0 {
            return Err(CryptoError::InvalidParams(
                "parallelism must be at least 1".into(),
            ));
        }
        if self.parallelism > MAX_PARALLELISM {
            return Err(CryptoError::InvalidParams(format!(
                "parallelism {} exceeds the supported maximum of {MAX_PARALLELISM}",
                self.parallelism
            )));
        }
        // bounded above, so this cannot overflow
        let min_memory = 8 * self.parallelism;
        if self.memory_kib < min_memory {
            return Err(CryptoError::InvalidParams(format!(
                "memory_kib must be at least 8 * parallelism ({min_memory}), got {}",
                self.memory_kib
            )));
        }
        if self.memory_kib > MAX_MEMORY_KIB {
            return Err(CryptoError::InvalidParams(format!(
                "memory_kib {} exceeds the supported maximum of {MAX_MEMORY_KIB}",
                self.memory_kib
            )));
        }

        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::InvalidParams(e.to_string()))
    }
}

/// Generate a random salt from the OS CSPRNG.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit KEK from a password and salt using Argon2id (v1.3).
///
/// Deterministic for identical inputs. `params` must come from the stored
/// record so that raising the default cost never breaks older records.
pub fn derive_kek(password: &SecretString, salt: &[u8], params: &KdfParams) -> CryptoResult<Kek> {
    if salt.len() < MIN_SALT_SIZE {
        return Err(CryptoError::InvalidParams(format!(
            "salt must be at least {MIN_SALT_SIZE} bytes, got {}",
            salt.len()
        )));
    }

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;

    let kek = Kek::from_bytes(key);
    key.zeroize();
    Ok(kek)
}
