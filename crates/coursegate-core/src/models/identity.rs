//! Identity aggregate.
//!
//! An identity owns at most one [`Session`] and any number of
//! [`Entitlement`]s. The methods here are the only sanctioned way to
//! change either; callers are responsible for holding the identity's lock
//! while they run and for persisting the result.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GateError, GateResult};
use crate::models::entitlement::{AccessWindow, CourseAccess, Entitlement};
use crate::models::session::{
    ConflictCheck, NewSession, Session, SessionCredential, SessionRejection,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IdentityStatus {
    Active,
    Blocked,
    /// Terminal. The record is kept but can never sign in again.
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    /// Never leaves the persistence boundary in serialized views.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub status: IdentityStatus,
    pub session: Option<Session>,
    pub entitlements: Vec<Entitlement>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIdentity {
    pub email: String,
    pub display_name: String,
    /// Already-hashed secret (Argon2id PHC string).
    pub password_hash: String,
}

impl Identity {
    pub fn is_online(&self) -> bool {
        self.session.is_some()
    }

    // -----------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------

    /// Read-only login gate. A conflict exists only when another device
    /// holds a session that is still fresh.
    pub fn check_conflict(
        &self,
        candidate_fingerprint: &str,
        now: DateTime<Utc>,
        inactivity_timeout: Duration,
    ) -> ConflictCheck {
        match &self.session {
            Some(session)
                if session.device_fingerprint != candidate_fingerprint
                    && !session.is_stale(now, inactivity_timeout) =>
            {
                ConflictCheck::Conflict(session.active_device())
            }
            _ => ConflictCheck::Clear,
        }
    }

    /// Drop the session, if any. Returns whether one was present.
    pub fn clear_session(&mut self) -> bool {
        self.session.take().is_some()
    }

    /// Overwrite any previous session with a fresh one.
    pub fn establish_session(&mut self, new: NewSession, now: DateTime<Utc>) -> &Session {
        self.session.insert(Session {
            session_id: Uuid::new_v4(),
            device_fingerprint: new.device_fingerprint,
            device_description: new.device_description,
            login_at: now,
            last_activity_at: now,
            source_address: new.source_address,
            location: new.location,
            secret_hash: new.secret_hash,
        })
    }

    /// Validate a request against the session and either touch it or
    /// clear it. Mismatch and timeout both clear the session before
    /// reporting. A device that passes both checks but presents the
    /// credential of an earlier session is refused and the current session
    /// is left alone.
    pub fn validate_session(
        &mut self,
        credential: SessionCredential<'_>,
        presented_fingerprint: &str,
        now: DateTime<Utc>,
        inactivity_timeout: Duration,
    ) -> Result<(), SessionRejection> {
        let Some(session) = self.session.as_mut() else {
            return Err(SessionRejection::NoSession);
        };

        if session.device_fingerprint != presented_fingerprint {
            self.session = None;
            return Err(SessionRejection::DeviceMismatch);
        }

        if session.is_stale(now, inactivity_timeout) {
            let last_activity_at = session.last_activity_at;
            self.session = None;
            return Err(SessionRejection::Timeout { last_activity_at });
        }

        if !session.accepts(credential) {
            return Err(SessionRejection::Superseded);
        }

        session.last_activity_at = now;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Entitlements
    // -----------------------------------------------------------------

    pub fn entitlement(&self, course_ref: &str) -> Option<&Entitlement> {
        self.entitlements.iter().find(|e| e.course_ref == course_ref)
    }

    fn entitlement_mut(&mut self, course_ref: &str) -> GateResult<&mut Entitlement> {
        self.entitlements
            .iter_mut()
            .find(|e| e.course_ref == course_ref)
            .ok_or_else(|| GateError::EntitlementNotFound {
                course_ref: course_ref.to_string(),
            })
    }

    /// Grant access to `course_ref` for `window`. A live grant for the same
    /// course is rejected; a lapsed one is replaced, keeping its progress.
    pub fn grant(
        &mut self,
        course_ref: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> GateResult<&Entitlement> {
        if window <= Duration::zero() {
            return Err(GateError::Validation {
                message: "entitlement window must be positive".into(),
            });
        }

        let fresh = Entitlement::new(course_ref, now, window);
        match self.entitlements.iter().position(|e| e.course_ref == course_ref) {
            Some(idx) if !self.entitlements[idx].is_lapsed(now) => Err(GateError::AlreadyGranted {
                course_ref: course_ref.to_string(),
            }),
            Some(idx) => {
                let progress = self.entitlements[idx].progress;
                let slot = &mut self.entitlements[idx];
                *slot = fresh;
                slot.progress = progress;
                Ok(&*slot)
            }
            None => {
                self.entitlements.push(fresh);
                Ok(&self.entitlements[self.entitlements.len() - 1])
            }
        }
    }

    /// True when the course was never granted or its window has passed.
    pub fn is_expired(&self, course_ref: &str, now: DateTime<Utc>) -> bool {
        self.entitlement(course_ref).is_none_or(|e| e.is_lapsed(now))
    }

    pub fn course_access(&self, course_ref: &str, now: DateTime<Utc>) -> CourseAccess {
        match self.entitlement(course_ref) {
            Some(e) => CourseAccess {
                expired: e.is_lapsed(now),
                window: Some(AccessWindow {
                    granted_at: e.granted_at,
                    expires_at: e.expires_at,
                }),
            },
            None => CourseAccess {
                expired: true,
                window: None,
            },
        }
    }

    pub fn active_entitlements(&self, now: DateTime<Utc>) -> Vec<&Entitlement> {
        self.entitlements
            .iter()
            .filter(|e| !e.is_lapsed(now))
            .collect()
    }

    pub fn extend_entitlement(&mut self, course_ref: &str, months: u32) -> GateResult<DateTime<Utc>> {
        self.entitlement_mut(course_ref)?.extend(months)
    }

    /// Flip the cached flag on every entitlement whose window has passed.
    /// Returns how many changed; zero means nothing needs persisting.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        self.entitlements
            .iter_mut()
            .map(|e| e.mark_expired_if_due(now))
            .filter(|changed| *changed)
            .count()
    }

    pub fn record_progress(&mut self, course_ref: &str, value: u8) -> GateResult<u8> {
        Ok(self.entitlement_mut(course_ref)?.record_progress(value))
    }
}
