//! Envelope: DEK generation and wrapping under a password-derived KEK

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::cipher;
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::Kek;
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// The 256-bit data-encryption key. The only key that ever touches field
/// plaintext. Zeroized on drop, never printed.
pub struct Dek {
    bytes: [u8; KEY_SIZE],
}

impl Dek {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for Dek {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Dek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dek").field("bytes", &"[REDACTED]").finish()
    }
}

/// A DEK encrypted under a KEK.
///
/// `ciphertext` is `[32 bytes: encrypted DEK][16 bytes: GCM tag]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedDek {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl WrappedDek {
    /// Length of a well-formed `ciphertext`.
    pub const CIPHERTEXT_LEN: usize = KEY_SIZE + TAG_SIZE;
}

/// Generate a fresh random DEK from the OS CSPRNG.
///
/// Called once per installation, at registration.
pub fn generate_dek() -> Dek {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    let dek = Dek::from_bytes(bytes);
    bytes.zeroize();
    dek
}

/// Wrap (encrypt) the DEK under a KEK with a fresh random nonce.
pub fn wrap_dek(dek: &Dek, kek: &Kek) -> CryptoResult<WrappedDek> {
    let (nonce, ciphertext) = cipher::seal(kek.as_bytes(), dek.as_bytes())?;
    Ok(WrappedDek { nonce, ciphertext })
}

/// Unwrap (decrypt) the DEK.
///
/// A wrong KEK, a tampered nonce/ciphertext/tag, or a payload that is not
/// exactly one key all produce the same [`CryptoError::Unwrap`].
pub fn unwrap_dek(wrapped: &WrappedDek, kek: &Kek) -> CryptoResult<Dek> {
    let plaintext = cipher::open(kek.as_bytes(), &wrapped.nonce, &wrapped.ciphertext)
        .map(Zeroizing::new)
        .ok_or(CryptoError::Unwrap)?;

    let mut bytes: [u8; KEY_SIZE] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::Unwrap)?;
    let dek = Dek::from_bytes(bytes);
    bytes.zeroize();
    Ok(dek)
}
