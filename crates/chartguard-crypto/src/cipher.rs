//! AES-256-GCM with a fresh random nonce per message.
//!
//! Ciphertext layout: `[N bytes: ciphertext][16 bytes: GCM tag]`. The nonce
//! travels separately so callers can persist it as its own field.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::{KEY_SIZE, NONCE_SIZE};

/// Encrypt `plaintext` under `key`, returning the nonce and ciphertext+tag.
pub(crate) fn seal(
    key: &[u8; KEY_SIZE],
    plaintext: &[u8],
) -> CryptoResult<([u8; NONCE_SIZE], Vec<u8>)> {
    let cipher = Aes256Gcm::new(key.into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok((nonce_bytes, ciphertext))
}

/// Decrypt ciphertext+tag. `None` on any authentication failure; the caller
/// decides which error that becomes.
pub(crate) fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> Option<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TAG_SIZE;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [7u8; KEY_SIZE];
        let (nonce, ct) = seal(&key, b"hello").unwrap();
        assert_eq!(ct.len(), 5 + TAG_SIZE);
        assert_eq!(open(&key, &nonce, &ct).unwrap(), b"hello");
    }

    #[test]
    fn test_open_wrong_nonce() {
        let key = [7u8; KEY_SIZE];
        let (mut nonce, ct) = seal(&key, b"hello").unwrap();
        nonce[0] ^= 0x01;
        assert!(open(&key, &nonce, &ct).is_none());
    }

    #[test]
    fn test_open_truncated() {
        let key = [7u8; KEY_SIZE];
        let (nonce, ct) = seal(&key, b"hello").unwrap();
        assert!(open(&key, &nonce, &ct[..ct.len() - 1]).is_none());
        assert!(open(&key, &nonce, &[]).is_none());
    }
}
