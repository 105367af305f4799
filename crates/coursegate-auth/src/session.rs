//! Single-device session lifecycle.
//!
//! An identity holds at most one session. Logging in from a second device
//! is refused while the first session is fresh, unless the caller forces
//! the old session out. Each validated request refreshes the session's
//! activity timestamp; a device mismatch or an idle timeout clears it.
//!
//! Every check reads the identity under its lock, so a block that lands
//! while a login is still verifying the password is seen before the
//! session is written.

use std::sync::Arc;

use chrono::Duration;
use coursegate_core::clock::Clock;
use coursegate_core::error::{GateError, GateResult};
use coursegate_core::models::identity::Identity;
use coursegate_core::models::session::{
    ActiveDevice, ConflictCheck, NewSession, Session, SessionCredential,
};
use coursegate_core::repository::IdentityRepository;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::locks::IdentityLocks;
use crate::token;

/// Device details supplied when opening a session.
#[derive(Debug, Clone)]
pub struct DeviceLogin {
    pub fingerprint: String,
    pub description: String,
    pub source_address: Option<String>,
    pub location: Option<String>,
}

/// Result of [`SessionManager::open`].
#[derive(Debug, Clone)]
pub enum SessionStart {
    Established {
        /// Raw session secret; only its digest is stored.
        secret: String,
        session: Session,
    },
    /// Another device holds a fresh session and no force was requested.
    Conflict(ActiveDevice),
}

pub struct SessionManager<R> {
    repo: Arc<R>,
    locks: Arc<IdentityLocks>,
    clock: Arc<dyn Clock>,
    config: Arc<AuthConfig>,
}

impl<R> Clone for SessionManager<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            locks: Arc::clone(&self.locks),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
        }
    }
}

impl<R: IdentityRepository> SessionManager<R> {
    pub fn new(
        repo: Arc<R>,
        locks: Arc<IdentityLocks>,
        clock: Arc<dyn Clock>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            repo,
            locks,
            clock,
            config,
        }
    }

    /// Whether a login from `candidate_fingerprint` would collide with a
    /// fresh session on another device. Read-only.
    pub async fn check_conflict(
        &self,
        identity_id: Uuid,
        candidate_fingerprint: &str,
    ) -> GateResult<ConflictCheck> {
        let identity = self.repo.get_by_id(identity_id).await?;
        Ok(identity.check_conflict(
            candidate_fingerprint,
            self.clock.now(),
            self.config.inactivity_timeout(),
        ))
    }

    /// Clear the session regardless of its state. Idempotent; returns
    /// whether a session was present.
    pub async fn force_logout(&self, identity_id: Uuid) -> GateResult<bool> {
        let _guard = self.locks.lock(identity_id).await;
        let cleared = self.clear_locked(identity_id).await?;
        if cleared {
            info!(%identity_id, "session forcibly cleared");
        }
        Ok(cleared)
    }

    /// Voluntary logout. Same effect as [`Self::force_logout`].
    pub async fn logout(&self, identity_id: Uuid) -> GateResult<bool> {
        let _guard = self.locks.lock(identity_id).await;
        let cleared = self.clear_locked(identity_id).await?;
        if cleared {
            info!(%identity_id, "logged out");
        }
        Ok(cleared)
    }

    /// Replace any existing session with a fresh one for `device`.
    /// Returns the raw session secret.
    pub async fn establish(&self, identity_id: Uuid, device: DeviceLogin) -> GateResult<String> {
        let _guard = self.locks.lock(identity_id).await;
        let (secret, _) = self.establish_locked(identity_id, device).await?;
        Ok(secret)
    }

    /// Status check, conflict check and establishment as one step under
    /// the identity lock. With `force`, an existing session is cleared
    /// first.
    pub async fn open(
        &self,
        identity_id: Uuid,
        device: DeviceLogin,
        force: bool,
    ) -> GateResult<SessionStart> {
        let _guard = self.locks.lock(identity_id).await;
        let mut identity = self.repo.get_by_id(identity_id).await?;
        self.require_active(&mut identity).await?;

        if force {
            if self.clear_locked(identity_id).await? {
                info!(%identity_id, "previous session displaced by forced login");
            }
        } else if let ConflictCheck::Conflict(active) = identity.check_conflict(
            &device.fingerprint,
            self.clock.now(),
            self.config.inactivity_timeout(),
        ) {
            info!(
                %identity_id,
                active_device = %active.device_description,
                "login refused: another device holds the session"
            );
            return Ok(SessionStart::Conflict(active));
        }

        let (secret, session) = self.establish_locked(identity_id, device).await?;
        Ok(SessionStart::Established { secret, session })
    }

    /// Validate a request carrying an access token for `session_id` from
    /// `presented_fingerprint`.
    ///
    /// On success the activity timestamp is refreshed and any entitlements
    /// that lapsed since the last sweep are flagged. A device mismatch or
    /// an idle timeout clears the session before the rejection is returned.
    /// A token of an earlier session is refused and the current session
    /// is kept. An identity that is no longer active loses its session.
    pub async fn validate(
        &self,
        identity_id: Uuid,
        session_id: Uuid,
        presented_fingerprint: &str,
    ) -> GateResult<()> {
        let _guard = self.locks.lock(identity_id).await;
        let mut identity = self.repo.get_by_id(identity_id).await?;
        self.require_active(&mut identity).await?;
        self.validate_locked(
            identity,
            SessionCredential::SessionId(session_id),
            presented_fingerprint,
        )
        .await
        .map(|_| ())
    }

    /// Validate a request that presents the raw session secret instead of
    /// an access token. Same checks and effects as [`Self::validate`].
    /// Returns the ID of the session the secret belongs to.
    pub async fn renew(
        &self,
        identity_id: Uuid,
        secret: &str,
        presented_fingerprint: &str,
    ) -> GateResult<Uuid> {
        let _guard = self.locks.lock(identity_id).await;
        let mut identity = self.repo.get_by_id(identity_id).await?;
        self.require_active(&mut identity).await?;
        let secret_hash = token::hash_session_secret(secret);
        self.validate_locked(
            identity,
            SessionCredential::SecretHash(&secret_hash),
            presented_fingerprint,
        )
        .await
    }

    /// Clear the session if it has been idle longer than `threshold`.
    /// Returns whether it was cleared.
    pub async fn clear_if_idle(&self, identity_id: Uuid, threshold: Duration) -> GateResult<bool> {
        let _guard = self.locks.lock(identity_id).await;
        let identity = self.repo.get_by_id(identity_id).await?;

        let Some(session) = identity.session else {
            return Ok(false);
        };
        if !session.is_stale(self.clock.now(), threshold) {
            return Ok(false);
        }

        self.repo.save_session(identity_id, None).await?;
        warn!(
            %identity_id,
            last_activity_at = %session.last_activity_at,
            "idle session cleared"
        );
        Ok(true)
    }

    async fn clear_locked(&self, identity_id: Uuid) -> GateResult<bool> {
        let mut identity = self.repo.get_by_id(identity_id).await?;
        if !identity.clear_session() {
            return Ok(false);
        }
        self.repo.save_session(identity_id, None).await?;
        Ok(true)
    }

    /// Refuse identities that may not hold a session, dropping any session
    /// left behind.
    async fn require_active(&self, identity: &mut Identity) -> GateResult<()> {
        let Some(refusal) = AuthError::for_status(identity.status) else {
            return Ok(());
        };
        if identity.clear_session() {
            self.repo.save_session(identity.id, None).await?;
            warn!(
                identity_id = %identity.id,
                status = ?identity.status,
                "session of inactive identity cleared"
            );
        }
        Err(refusal.into())
    }

    /// Returns the ID of the validated session.
    async fn validate_locked(
        &self,
        mut identity: Identity,
        credential: SessionCredential<'_>,
        presented_fingerprint: &str,
    ) -> GateResult<Uuid> {
        let identity_id = identity.id;
        let now = self.clock.now();
        let had_session = identity.is_online();

        if let Err(rejection) = identity.validate_session(
            credential,
            presented_fingerprint,
            now,
            self.config.inactivity_timeout(),
        ) {
            if had_session && !identity.is_online() {
                self.repo.save_session(identity_id, None).await?;
                warn!(%identity_id, reason = %rejection, "session cleared");
            } else {
                debug!(%identity_id, reason = %rejection, "request refused");
            }
            return Err(GateError::SessionRejected(rejection));
        }

        let Some(session) = identity.session.clone() else {
            return Err(GateError::Internal("validated session vanished".into()));
        };
        let session_id = session.session_id;
        self.repo.save_session(identity_id, Some(session)).await?;
        debug!(%identity_id, "session touched");

        let lapsed = identity.sweep_expired(now);
        if lapsed > 0 {
            self.repo
                .save_entitlements(identity_id, identity.entitlements)
                .await?;
            info!(%identity_id, lapsed, "entitlements flagged expired");
        }
        Ok(session_id)
    }

    async fn establish_locked(
        &self,
        identity_id: Uuid,
        device: DeviceLogin,
    ) -> GateResult<(String, Session)> {
        let mut identity = self.repo.get_by_id(identity_id).await?;
        self.require_active(&mut identity).await?;
        let secret = token::generate_session_secret();

        let session = identity
            .establish_session(
                NewSession {
                    device_fingerprint: device.fingerprint,
                    device_description: device.description,
                    source_address: device.source_address,
                    location: device.location,
                    secret_hash: token::hash_session_secret(&secret),
                },
                self.clock.now(),
            )
            .clone();

        self.repo
            .save_session(identity_id, Some(session.clone()))
            .await?;
        info!(
            %identity_id,
            device = %session.device_description,
            "session established"
        );
        Ok((secret, session))
    }
}
