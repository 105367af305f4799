//! Authentication error types.

use coursegate_core::error::GateError;
use coursegate_core::models::identity::IdentityStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is blocked")]
    AccountBlocked,

    #[error("account has been removed")]
    AccountRemoved,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl AuthError {
    /// Refusal for an identity whose status does not allow a session.
    pub fn for_status(status: IdentityStatus) -> Option<Self> {
        match status {
            IdentityStatus::Active => None,
            IdentityStatus::Blocked => Some(Self::AccountBlocked),
            IdentityStatus::Removed => Some(Self::AccountRemoved),
        }
    }
}

impl From<AuthError> for GateError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::AccountBlocked
            | AuthError::AccountRemoved
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_) => GateError::AuthenticationFailed {
                reason: err.to_string(),
            },
            AuthError::Crypto(msg) => GateError::Crypto(msg),
        }
    }
}
