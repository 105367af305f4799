//! Error types for the Coursegate system.

use thiserror::Error;

use crate::models::session::SessionRejection;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// The presented session is not usable; the caller must
    /// re-authenticate.
    #[error("Session rejected: {0}")]
    SessionRejected(SessionRejection),

    #[error("No entitlement for course {course_ref}")]
    EntitlementNotFound { course_ref: String },

    #[error("Course {course_ref} is already granted and still active")]
    AlreadyGranted { course_ref: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionRejection> for GateError {
    fn from(rejection: SessionRejection) -> Self {
        GateError::SessionRejected(rejection)
    }
}

pub type GateResult<T> = Result<T, GateError>;
