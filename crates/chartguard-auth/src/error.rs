use chartguard_crypto::CryptoError;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential record yet: the caller should offer registration.
    #[error("no credential record found")]
    RecordNotFound,

    /// Malformed or schema-invalid record. Unrecoverable without a reset.
    #[error("credential record is corrupt: {0}")]
    RecordCorrupt(String),

    /// Wrong password or tampered wrapped key. The two are never told apart.
    #[error("incorrect credentials")]
    IncorrectCredentials,

    /// One encrypted field failed authentication under a trusted key.
    #[error("encrypted field failed integrity check")]
    FieldIntegrity,

    #[error("no authenticated session")]
    NotAuthenticated,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("a credential record already exists")]
    AlreadyInitialized,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cryptographic failure: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// False for the failures a user cannot fix by retrying.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::RecordCorrupt(_) | Self::FieldIntegrity)
    }

    /// Generic text safe to show on a login or registration screen.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::IncorrectCredentials | Self::RecordNotFound | Self::RecordCorrupt(_) => {
                "incorrect password"
            }
            Self::AlreadyInitialized => "an account already exists",
            Self::InvalidInput(_) => {
                "username must not be empty and password must be at least 8 characters"
            }
            Self::NotAuthenticated => "please sign in first",
            Self::FieldIntegrity => "stored data could not be read",
            Self::Configuration(_) | Self::Crypto(_) | Self::Io(_) => "something went wrong",
        }
    }
}

impl From<CryptoError> for AuthError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidParams(msg) | CryptoError::Kdf(msg) => Self::Configuration(msg),
            CryptoError::Unwrap => Self::IncorrectCredentials,
            CryptoError::Integrity => Self::FieldIntegrity,
            CryptoError::Encryption(msg) => Self::Crypto(msg),
        }
    }
}
