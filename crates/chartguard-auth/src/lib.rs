//! chartguard-auth: single-user credentials and the field-encryption session
//!
//! - [`store`]: the on-disk credential record (exists / load / atomic save /
//!   initialize / reset)
//! - [`session`]: login state machine holding the DEK in memory, and the
//!   field encrypt/decrypt operations gated on it
//!
//! The password is never stored or hashed. Login succeeds exactly when the
//! Argon2id KEK derived from it unwraps the stored DEK.

pub mod error;
pub mod record;
pub mod session;
pub mod store;

pub use error::{AuthError, AuthResult};
pub use record::CredentialRecord;
pub use session::Session;
pub use store::CredentialStore;

use secrecy::{ExposeSecret, SecretString};

/// Minimum password length in characters, enforced when a password is set.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Rules for a new account. Login never re-applies them.
pub(crate) fn validate_registration(username: &str, password: &SecretString) -> AuthResult<()> {
    if username.trim().is_empty() {
        return Err(AuthError::InvalidInput("username must not be empty".into()));
    }
    validate_password(password)
}

pub(crate) fn validate_password(password: &SecretString) -> AuthResult<()> {
    if password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
