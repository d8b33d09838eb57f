//! The process-wide session: holds the unwrapped DEK between login and logout
//!
//! ```text
//!                 authenticate(ok) / register
//!  Unauthenticated ───────────────────────────▶ Authenticated ──┐ change_password
//!        ▲    │ authenticate(err)                 │   ▲        │ (DEK unchanged)
//!        │    ▼                                   │   └────────┘
//!        │  Locked ── authenticate(ok) ──────────▶│
//!        └──────────────── logout ◀──────────────┘
//! ```
//!
//! Only the DEK is retained, never the password. Every operation holds the
//! one session lock for its whole duration, so a logout can never free the
//! key out from under an in-flight field decrypt.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroizing;

use chartguard_core::{SessionStatus, UserInfo};
use chartguard_crypto::{
    decrypt_field, derive_kek, encrypt_field, generate_salt, unwrap_dek, wrap_dek, Dek,
    EncryptedField,
};

use crate::error::{AuthError, AuthResult};
use crate::store::CredentialStore;
use crate::validate_password;

#[derive(Debug)]
enum State {
    Unauthenticated,
    Authenticated { dek: Dek, user: UserInfo },
    Locked,
}

#[derive(Debug)]
struct Inner {
    state: State,
    /// Consecutive failed password checks since the last success or logout
    failed_attempts: u32,
}

/// Lock-guarded session state. Construct once at startup and share by
/// reference (or `Arc`) with whatever issues commands.
#[derive(Debug)]
pub struct Session {
    store: CredentialStore,
    inner: Mutex<Inner>,
}

impl Session {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner {
                state: State::Unauthenticated,
                failed_attempts: 0,
            }),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Whether the installation has a user yet.
    pub fn exists(&self) -> bool {
        self.store.exists()
    }

    // Every transition replaces the state wholesale, so a guard recovered
    // from a panicked holder still sees a consistent value.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the credential record and start an authenticated session.
    pub fn register(&self, username: &str, password: &SecretString) -> AuthResult<UserInfo> {
        let mut inner = self.lock();
        let (record, dek) = self.store.create(username, password)?;
        let user = record.user_info();

        inner.state = State::Authenticated {
            dek,
            user: user.clone(),
        };
        inner.failed_attempts = 0;
        tracing::info!(user_id = %user.user_id, "registered and signed in");
        Ok(user)
    }

    /// Derive the KEK from `password` and unwrap the DEK.
    ///
    /// On failure any previously held key is discarded and the session is
    /// `Locked`. A wrong password and a tampered wrapped key both surface as
    /// [`AuthError::IncorrectCredentials`].
    pub fn authenticate(&self, password: &SecretString) -> AuthResult<UserInfo> {
        let mut inner = self.lock();

        match self.unlock(password) {
            Ok((dek, user)) => {
                inner.state = State::Authenticated {
                    dek,
                    user: user.clone(),
                };
                inner.failed_attempts = 0;
                tracing::info!(user_id = %user.user_id, "signed in");
                Ok(user)
            }
            Err(e) => {
                inner.state = State::Locked;
                inner.failed_attempts = inner.failed_attempts.saturating_add(1);
                tracing::warn!(
                    attempts = inner.failed_attempts,
                    error = %e,
                    "authentication failed"
                );
                Err(e)
            }
        }
    }

    fn unlock(&self, password: &SecretString) -> AuthResult<(Dek, UserInfo)> {
        let record = self.store.load()?;
        let kek = derive_kek(password, &record.salt()?, &record.kdf.params)?;
        let dek = unwrap_dek(&record.wrapped()?, &kek)?;
        Ok((dek, record.user_info()))
    }

    /// Drop the DEK (zeroized) and return to `Unauthenticated`.
    pub fn logout(&self) {
        let mut inner = self.lock();
        if let State::Authenticated { user, .. } = &inner.state {
            tracing::info!(user_id = %user.user_id, "signed out");
        }
        inner.state = State::Unauthenticated;
        inner.failed_attempts = 0;
    }

    /// Re-wrap the held DEK under a KEK derived from `new_password` and a
    /// fresh salt, after proving `old_password` against the stored record.
    ///
    /// Fields encrypted before the change stay readable: the DEK is the same.
    pub fn change_password(
        &self,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> AuthResult<()> {
        validate_password(new_password)?;

        let mut guard = self.lock();
        let inner = &mut *guard;
        let State::Authenticated { dek, user } = &inner.state else {
            return Err(AuthError::NotAuthenticated);
        };
        let user_id = user.user_id.clone();

        let record = self.store.load()?;
        let old_kek = derive_kek(old_password, &record.salt()?, &record.kdf.params)?;
        let stored_dek = match unwrap_dek(&record.wrapped()?, &old_kek) {
            Ok(stored) => stored,
            Err(e) => {
                inner.failed_attempts = inner.failed_attempts.saturating_add(1);
                tracing::warn!(
                    attempts = inner.failed_attempts,
                    "password change rejected: current password did not verify"
                );
                return Err(e.into());
            }
        };
        // The record on disk was replaced since sign-in
        if stored_dek.as_bytes() != dek.as_bytes() || record.user_id != user_id {
            tracing::warn!(
                user_id = %user_id,
                "password change rejected: credential record no longer matches the session"
            );
            return Err(AuthError::IncorrectCredentials);
        }

        let salt = generate_salt();
        let params = *self.store.kdf_params();
        let new_kek = derive_kek(new_password, &salt, &params)?;
        let wrapped = wrap_dek(dek, &new_kek)?;

        self.store
            .save(&record.rewrapped(&salt, params, &wrapped, Utc::now()))?;

        inner.failed_attempts = 0;
        tracing::info!(user_id = %user_id, "password changed");
        Ok(())
    }

    fn with_dek<R>(&self, f: impl FnOnce(&Dek) -> AuthResult<R>) -> AuthResult<R> {
        let inner = self.lock();
        match &inner.state {
            State::Authenticated { dek, .. } => f(dek),
            State::Unauthenticated | State::Locked => Err(AuthError::NotAuthenticated),
        }
    }

    /// Encrypt one sensitive text field under the DEK with a fresh nonce.
    pub fn encrypt_field(&self, plaintext: &str) -> AuthResult<EncryptedField> {
        self.with_dek(|dek| Ok(encrypt_field(dek, plaintext.as_bytes())?))
    }

    /// Decrypt one text field. A failed tag check is
    /// [`AuthError::FieldIntegrity`], never a credentials error.
    pub fn decrypt_field(&self, field: &EncryptedField) -> AuthResult<String> {
        self.with_dek(|dek| open_text(dek, field))
    }

    /// Decrypt a batch under a single lock acquisition. The outer error is
    /// only `NotAuthenticated`; each field reports its own integrity result.
    pub fn decrypt_fields<'a, I>(&self, fields: I) -> AuthResult<Vec<AuthResult<String>>>
    where
        I: IntoIterator<Item = &'a EncryptedField>,
    {
        self.with_dek(|dek| Ok(fields.into_iter().map(|field| open_text(dek, field)).collect()))
    }

    /// Serialize `value` to JSON and encrypt it as one field.
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> AuthResult<EncryptedField> {
        let json = Zeroizing::new(
            serde_json::to_vec(value)
                .map_err(|e| AuthError::InvalidInput(format!("serializing field: {e}")))?,
        );
        self.with_dek(|dek| Ok(encrypt_field(dek, &json)?))
    }

    /// Decrypt a field written by [`Session::encrypt_json`].
    pub fn decrypt_json<T: DeserializeOwned>(&self, field: &EncryptedField) -> AuthResult<T> {
        let json = Zeroizing::new(self.with_dek(|dek| open_bytes(dek, field))?);
        serde_json::from_slice(&json).map_err(|_| {
            tracing::warn!("encrypted field decrypted but is not the expected JSON shape");
            AuthError::FieldIntegrity
        })
    }

    pub fn status(&self) -> SessionStatus {
        match &self.lock().state {
            State::Unauthenticated => SessionStatus::Unauthenticated,
            State::Authenticated { user, .. } => SessionStatus::Authenticated { user: user.clone() },
            State::Locked => SessionStatus::Locked,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.lock().state, State::Authenticated { .. })
    }

    pub fn user(&self) -> Option<UserInfo> {
        match &self.lock().state {
            State::Authenticated { user, .. } => Some(user.clone()),
            _ => None,
        }
    }

    /// Consecutive failed password checks, for callers that throttle retries.
    pub fn failed_attempts(&self) -> u32 {
        self.lock().failed_attempts
    }

    /// Log out and delete the credential record.
    pub fn reset_account(&self) -> AuthResult<bool> {
        let mut inner = self.lock();
        inner.state = State::Unauthenticated;
        inner.failed_attempts = 0;
        self.store.reset()
    }
}

fn open_bytes(dek: &Dek, field: &EncryptedField) -> AuthResult<Vec<u8>> {
    decrypt_field(dek, field).map_err(|e| {
        tracing::warn!("encrypted field failed integrity check");
        e.into()
    })
}

fn open_text(dek: &Dek, field: &EncryptedField) -> AuthResult<String> {
    let plaintext = open_bytes(dek, field)?;
    String::from_utf8(plaintext).map_err(|e| {
        let mut bytes = e.into_bytes();
        zeroize::Zeroize::zeroize(&mut bytes);
        tracing::warn!("encrypted field is not valid UTF-8");
        AuthError::FieldIntegrity
    })
}
