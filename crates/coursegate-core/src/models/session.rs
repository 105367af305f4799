//! Device-bound session embedded in an identity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The single active-login record of an identity.
///
/// Presence of a `Session` on an identity is what "online" means; a
/// cleared session is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Fresh for every login; access tokens carry it as their `sid`.
    pub session_id: Uuid,
    pub device_fingerprint: String,
    /// Display-only summary, never used for authorization.
    pub device_description: String,
    pub login_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub source_address: Option<String>,
    pub location: Option<String>,
    /// SHA-256 hex digest of the secret handed out at login.
    #[serde(skip_serializing, default)]
    pub secret_hash: String,
}

impl Session {
    /// Time elapsed since the last authenticated request.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_activity_at
    }

    /// A session is stale once it has been idle for strictly longer than
    /// `timeout`.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.idle_for(now) > timeout
    }

    /// Whether `credential` was issued for this session.
    pub fn accepts(&self, credential: SessionCredential<'_>) -> bool {
        match credential {
            SessionCredential::SessionId(id) => self.session_id == id,
            SessionCredential::SecretHash(hash) => self.secret_hash == hash,
        }
    }

    pub fn active_device(&self) -> ActiveDevice {
        ActiveDevice {
            device_description: self.device_description.clone(),
            login_at: self.login_at,
            last_activity_at: self.last_activity_at,
            location: self.location.clone(),
        }
    }
}

/// Proof a request presents that it belongs to a particular session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCredential<'a> {
    /// The `sid` claim of an access token.
    SessionId(Uuid),
    /// Digest of the raw session secret.
    SecretHash(&'a str),
}

/// Input for establishing a new session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub device_fingerprint: String,
    pub device_description: String,
    pub source_address: Option<String>,
    pub location: Option<String>,
    pub secret_hash: String,
}

/// What a user is shown when another device still holds the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDevice {
    pub device_description: String,
    pub login_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub location: Option<String>,
}

/// Result of the login-time conflict gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCheck {
    Clear,
    Conflict(ActiveDevice),
}

/// Why a request-time session check failed.
///
/// Messages deliberately do not reveal which device attribute differed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionRejection {
    #[error("no active session")]
    NoSession,

    #[error("session belongs to a different device, please sign in again")]
    DeviceMismatch,

    #[error("session timed out after inactivity (last active {last_activity_at})")]
    Timeout { last_activity_at: DateTime<Utc> },

    /// The credential belongs to a session that a later login replaced.
    #[error("session was replaced by a newer sign-in")]
    Superseded,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_idle(minutes: i64, now: DateTime<Utc>) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            device_fingerprint: "fp".into(),
            device_description: "Chrome on Linux (desktop)".into(),
            login_at: now - Duration::hours(2),
            last_activity_at: now - Duration::minutes(minutes),
            source_address: None,
            location: None,
            secret_hash: "hash".into(),
        }
    }

    #[test]
    fn staleness_is_strictly_greater_than_timeout() {
        let now = Utc::now();
        let timeout = Duration::minutes(30);
        assert!(!session_idle(29, now).is_stale(now, timeout));
        assert!(!session_idle(30, now).is_stale(now, timeout));
        assert!(session_idle(31, now).is_stale(now, timeout));
    }

    #[test]
    fn session_accepts_only_its_own_credentials() {
        let session = session_idle(1, Utc::now());
        assert!(session.accepts(SessionCredential::SessionId(session.session_id)));
        assert!(!session.accepts(SessionCredential::SessionId(Uuid::new_v4())));
        assert!(session.accepts(SessionCredential::SecretHash("hash")));
        assert!(!session.accepts(SessionCredential::SecretHash("other")));
    }

    #[test]
    fn secret_hash_is_never_serialized() {
        let json = serde_json::to_string(&session_idle(1, Utc::now())).unwrap();
        assert!(!json.contains("secret_hash"));
    }

    #[test]
    fn mismatch_message_does_not_name_attributes() {
        let msg = SessionRejection::DeviceMismatch.to_string();
        assert!(!msg.contains("resolution"));
        assert!(!msg.contains("timezone"));
    }
}
