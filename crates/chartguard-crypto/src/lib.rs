//! chartguard-crypto: envelope encryption for locally stored records
//!
//! Key hierarchy:
//! ```text
//! Password
//!   └── KEK (256-bit, Argon2id(password, salt, params)), never stored
//!       └── wrapped DEK: AES-256-GCM(key=KEK, nonce=random_96bit), stored in the credential record
//!           └── DEK (256-bit random, generated once)
//!               └── Field AEAD: AES-256-GCM(key=DEK, nonce=random_96bit)
//! ```
//!
//! Password correctness is never checked against a stored hash. A KEK derived
//! from the wrong password simply fails the GCM tag check on the wrapped DEK.

mod cipher;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod field;
pub mod kdf;

pub use envelope::{generate_dek, unwrap_dek, wrap_dek, Dek, WrappedDek};
pub use error::{CryptoError, CryptoResult};
pub use field::{decrypt_field, encrypt_field, EncryptedField};
pub use kdf::{derive_kek, generate_salt, KdfParams, Kek};

/// Size of a KEK or DEK in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a freshly generated Argon2id salt
pub const SALT_SIZE: usize = 16;

/// Shortest salt accepted when deriving from a stored record
pub const MIN_SALT_SIZE: usize = 16;
