use serde::{Deserialize, Serialize};

/// Non-secret identity of the installation's single user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    pub username: String,
}

/// Observable state of the process-wide session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    /// No key held; nothing attempted since start or logout
    Unauthenticated,
    /// DEK held in memory
    Authenticated { user: UserInfo },
    /// The last authentication attempt failed
    Locked,
}

/// What a login/registration screen is allowed to see.
///
/// `message` is always one of a few generic strings; it never says whether
/// the record file or the password was the problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub user: Option<UserInfo>,
}

impl AuthResponse {
    pub fn success(message: impl Into<String>, user: UserInfo) -> Self {
        Self {
            success: true,
            message: message.into(),
            user: Some(user),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            user: None,
        }
    }
}
