//! Per-field AES-256-GCM encryption under the DEK
//!
//! Serialized form (what the record-storage layer persists):
//! ```json
//! { "nonce": "<base64, 12 bytes>", "ciphertext": "<base64, plaintext_len + 16 bytes>" }
//! ```
//!
//! Every call draws a new random 96-bit nonce, so a field is re-created on each
//! write and never updated in place.

use serde::{Deserialize, Serialize};

use crate::cipher;
use crate::envelope::Dek;
use crate::error::{CryptoError, CryptoResult};
use crate::NONCE_SIZE;

/// One encrypted sensitive field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedField {
    #[serde(with = "crate::encoding::base64_array")]
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with the 16-byte GCM tag appended
    #[serde(with = "crate::encoding::base64_vec")]
    pub ciphertext: Vec<u8>,
}

/// Encrypt a field's bytes under the DEK with a fresh nonce.
pub fn encrypt_field(dek: &Dek, plaintext: &[u8]) -> CryptoResult<EncryptedField> {
    let (nonce, ciphertext) = cipher::seal(dek.as_bytes(), plaintext)?;
    Ok(EncryptedField { nonce, ciphertext })
}

/// Decrypt a field. Any authentication failure is [`CryptoError::Integrity`]:
/// the key is already trusted, so a bad tag means the stored bytes changed.
pub fn decrypt_field(dek: &Dek, field: &EncryptedField) -> CryptoResult<Vec<u8>> {
    cipher::open(dek.as_bytes(), &field.nonce, &field.ciphertext).ok_or(CryptoError::Integrity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::generate_dek;
    use crate::TAG_SIZE;
    use std::collections::HashSet;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let dek = generate_dek();
        let field = encrypt_field(&dek, b"patient reports cough").unwrap();
        let plaintext = decrypt_field(&dek, &field).unwrap();
        assert_eq!(plaintext, b"patient reports cough");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let dek = generate_dek();
        let field = encrypt_field(&dek, b"").unwrap();
        assert_eq!(field.ciphertext.len(), TAG_SIZE);
        assert_eq!(decrypt_field(&dek, &field).unwrap(), b"");
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let field = encrypt_field(&generate_dek(), b"secret data").unwrap();
        let result = decrypt_field(&generate_dek(), &field);
        assert!(matches!(result, Err(CryptoError::Integrity)));
    }

    #[test]
    fn test_nonces_unique_under_load() {
        let dek = generate_dek();
        let n = 512;
        let fields: Vec<_> = (0..n)
            .map(|_| encrypt_field(&dek, b"same plaintext every time").unwrap())
            .collect();

        let nonces: HashSet<_> = fields.iter().map(|f| f.nonce).collect();
        let ciphertexts: HashSet<_> = fields.iter().map(|f| f.ciphertext.clone()).collect();
        assert_eq!(nonces.len(), n);
        assert_eq!(ciphertexts.len(), n);
    }

    #[test]
    fn test_every_bit_flip_detected() {
        let dek = generate_dek();
        let field = encrypt_field(&dek, b"BP 120/80").unwrap();

        for byte in 0..field.ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = field.clone();
                tampered.ciphertext[byte] ^= 1 << bit;
                assert!(
                    matches!(decrypt_field(&dek, &tampered), Err(CryptoError::Integrity)),
                    "flip at byte {byte} bit {bit} went undetected"
                );
            }
        }
    }

    #[test]
    fn test_truncated_ciphertext_detected() {
        let dek = generate_dek();
        let mut field = encrypt_field(&dek, b"abc").unwrap();
        field.ciphertext.truncate(4);
        assert!(matches!(decrypt_field(&dek, &field), Err(CryptoError::Integrity)));
    }

    #[test]
    fn test_json_shape() {
        let dek = generate_dek();
        let field = encrypt_field(&dek, b"note").unwrap();
        let json: serde_json::Value = serde_json::to_value(&field).unwrap();

        assert!(json["nonce"].is_string());
        assert!(json["ciphertext"].is_string());

        let back: EncryptedField = serde_json::from_value(json).unwrap();
        assert_eq!(decrypt_field(&dek, &back).unwrap(), b"note");
    }

    #[test]
    fn test_json_bad_nonce_length_rejected() {
        let json = r#"{"nonce":"AAAA","ciphertext":""}"#;
        assert!(serde_json::from_str::<EncryptedField>(json).is_err());
    }
}
