use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid Argon2id parameters: {0}")]
    InvalidParams(String),

    #[error("Argon2id KDF failed: {0}")]
    Kdf(String),

    /// Wrong KEK and tampered wrapped key are deliberately the same error.
    #[error("key unwrapping failed")]
    Unwrap,

    #[error("field decryption failed: ciphertext is corrupted or was tampered with")]
    Integrity,

    #[error("encryption failed: {0}")]
    Encryption(String),
}
