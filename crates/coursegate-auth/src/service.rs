//! Authentication service: registration, login and request
//! authentication orchestration.

use std::sync::Arc;

use coursegate_core::clock::{Clock, SystemClock};
use coursegate_core::error::{GateError, GateResult};
use coursegate_core::models::device::DeviceAttributes;
use coursegate_core::models::identity::{CreateIdentity, Identity, IdentityStatus};
use coursegate_core::models::session::ActiveDevice;
use coursegate_core::repository::IdentityRepository;
use tracing::info;
use uuid::Uuid;

use crate::config::{AuthConfig, SchedulerConfig};
use crate::entitlements::{EntitlementService, EntitlementSummary};
use crate::error::AuthError;
use crate::fingerprint;
use crate::inspector::SessionInspector;
use crate::locks::IdentityLocks;
use crate::notify::ExpiryNotifier;
use crate::password;
use crate::scheduler::ExpiryScheduler;
use crate::session::{DeviceLogin, SessionManager, SessionStart};
use crate::token;

/// Input for registration.
#[derive(Debug)]
pub struct RegisterInput {
    pub email: String,
    pub display_name: String,
    pub password: String,
}

/// Input for the login flow.
#[derive(Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub device: DeviceAttributes,
    pub source_address: Option<String>,
    pub location: Option<String>,
    /// Displace a fresh session held by another device.
    pub force_logout: bool,
}

/// Successful login result.
#[derive(Debug)]
pub struct LoginOutput {
    pub identity_id: Uuid,
    /// Signed JWT access token.
    pub access_token: String,
    /// Raw session secret (return to client, not stored).
    pub session_secret: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub device_description: String,
    pub entitlements: EntitlementSummary,
}

/// Fresh access token for a session that is still valid.
#[derive(Debug)]
pub struct RefreshOutput {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(LoginOutput),
    /// Another device holds a fresh session. Retry with `force_logout`
    /// to take it over.
    Conflict(ActiveDevice),
}

/// Authentication service.
///
/// Generic over the repository implementation so that the auth layer
/// has no dependency on the database crate. All components handed out
/// by this service share one lock registry and one clock.
pub struct AuthService<R> {
    repo: Arc<R>,
    locks: Arc<IdentityLocks>,
    clock: Arc<dyn Clock>,
    config: Arc<AuthConfig>,
    sessions: SessionManager<R>,
    entitlements: EntitlementService<R>,
}

impl<R: IdentityRepository> AuthService<R> {
    pub fn new(repo: R, config: AuthConfig) -> Self {
        Self::with_clock(Arc::new(repo), Arc::new(SystemClock), config)
    }

    pub fn with_clock(repo: Arc<R>, clock: Arc<dyn Clock>, config: AuthConfig) -> Self {
        let locks = Arc::new(IdentityLocks::new());
        let config = Arc::new(config);
        let sessions = SessionManager::new(
            Arc::clone(&repo),
            Arc::clone(&locks),
            Arc::clone(&clock),
            Arc::clone(&config),
        );
        let entitlements = EntitlementService::new(
            Arc::clone(&repo),
            Arc::clone(&locks),
            Arc::clone(&clock),
            Arc::clone(&config),
        );
        Self {
            repo,
            locks,
            clock,
            config,
            sessions,
            entitlements,
        }
    }

    pub fn sessions(&self) -> &SessionManager<R> {
        &self.sessions
    }

    pub fn entitlements(&self) -> &EntitlementService<R> {
        &self.entitlements
    }

    pub fn inspector(&self) -> SessionInspector<R> {
        SessionInspector::new(Arc::clone(&self.repo))
    }

    pub fn scheduler<N: ExpiryNotifier>(
        &self,
        notifier: N,
        config: SchedulerConfig,
    ) -> ExpiryScheduler<R, N> {
        ExpiryScheduler::new(
            Arc::clone(&self.repo),
            Arc::clone(&self.locks),
            Arc::clone(&self.clock),
            Arc::clone(&self.config),
            notifier,
            config,
        )
    }

    /// Create a new active identity.
    pub async fn register(&self, input: RegisterInput) -> GateResult<Identity> {
        let email = normalize_email(&input.email)?;
        if input.password.chars().count() < self.config.min_password_length {
            return Err(GateError::Validation {
                message: format!(
                    "password must be at least {} characters",
                    self.config.min_password_length
                ),
            });
        }

        // 1. Reject taken addresses before paying for a hash.
        match self.repo.get_by_email(&email).await {
            Ok(_) => {
                return Err(GateError::AlreadyExists {
                    entity: "identity".into(),
                });
            }
            Err(GateError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        // 2. Hash off the async runtime.
        let config = Arc::clone(&self.config);
        let secret = input.password;
        let password_hash =
            tokio::task::spawn_blocking(move || password::hash_password(&secret, &config))
                .await
                .map_err(|e| GateError::Internal(format!("hashing task failed: {e}")))??;

        // 3. Persist. A concurrent registration still loses on the
        //    unique email index.
        let identity = self
            .repo
            .create(CreateIdentity {
                email,
                display_name: input.display_name.trim().to_string(),
                password_hash,
            })
            .await?;
        info!(identity_id = %identity.id, "identity registered");
        Ok(identity)
    }

    /// Verify credentials, enforce the single-device rule and issue
    /// tokens.
    pub async fn login(&self, input: LoginInput) -> GateResult<LoginOutcome> {
        // 1. Look up the identity.
        let email = normalize_email(&input.email).map_err(|_| AuthError::InvalidCredentials)?;
        let identity = match self.repo.get_by_email(&email).await {
            Ok(identity) => identity,
            Err(GateError::NotFound { .. }) => return Err(AuthError::InvalidCredentials.into()),
            Err(e) => return Err(e),
        };

        // 2. Verify the secret off the async runtime.
        let digest = identity.password_hash.clone();
        let pepper = self.config.pepper.clone();
        let candidate = input.password;
        let valid = tokio::task::spawn_blocking(move || {
            password::verify_password(&candidate, &digest, pepper.as_deref())
        })
        .await
        .map_err(|e| GateError::Internal(format!("verification task failed: {e}")))?;
        if !valid {
            return Err(AuthError::InvalidCredentials.into());
        }

        // 3. Open the session, unless another device holds it. The
        //    account status is checked under the identity lock, not on the
        //    snapshot read before verification.
        let device = DeviceLogin {
            fingerprint: fingerprint::fingerprint(&input.device),
            description: fingerprint::describe(&input.device),
            source_address: input.source_address,
            location: input.location,
        };
        let (secret, session) = match self
            .sessions
            .open(identity.id, device, input.force_logout)
            .await?
        {
            SessionStart::Established { secret, session } => (secret, session),
            SessionStart::Conflict(active) => return Ok(LoginOutcome::Conflict(active)),
        };

        // 4. Bring the expired flags up to date for the summary.
        self.entitlements.sweep_expired(identity.id).await?;
        let entitlements = self.entitlements.summary(identity.id).await?;

        // 5. Issue a JWT access token bound to this session.
        let access_token = token::issue_access_token(
            identity.id,
            session.session_id,
            self.clock.now(),
            &self.config,
        )?;

        Ok(LoginOutcome::Authenticated(LoginOutput {
            identity_id: identity.id,
            access_token,
            session_secret: secret,
            expires_in: self.config.access_token_lifetime_secs,
            device_description: session.device_description,
            entitlements,
        }))
    }

    /// Authenticate a request: verify the bearer token, then validate the
    /// presenting device against the session the token was issued for.
    /// Returns the identity ID on success.
    pub async fn authenticate(&self, bearer: &str, device: &DeviceAttributes) -> GateResult<Uuid> {
        let claims = token::decode_access_token(bearer, self.clock.now(), &self.config)?;
        let identity_id = claims.identity_id()?;
        self.sessions
            .validate(
                identity_id,
                claims.session_id()?,
                &fingerprint::fingerprint(device),
            )
            .await?;
        Ok(identity_id)
    }

    /// Exchange the session secret handed out at login for a new access
    /// token. The session is validated and touched exactly as for an
    /// authenticated request.
    pub async fn refresh(
        &self,
        identity_id: Uuid,
        session_secret: &str,
        device: &DeviceAttributes,
    ) -> GateResult<RefreshOutput> {
        let session_id = self
            .sessions
            .renew(identity_id, session_secret, &fingerprint::fingerprint(device))
            .await?;
        let access_token =
            token::issue_access_token(identity_id, session_id, self.clock.now(), &self.config)?;
        info!(%identity_id, "access token refreshed");
        Ok(RefreshOutput {
            access_token,
            expires_in: self.config.access_token_lifetime_secs,
        })
    }

    pub async fn logout(&self, identity_id: Uuid) -> GateResult<()> {
        self.sessions.logout(identity_id).await.map(|_| ())
    }

    /// Block an identity and end its session.
    pub async fn block(&self, identity_id: Uuid) -> GateResult<Identity> {
        let _guard = self.locks.lock(identity_id).await;
        let identity = self.set_status(identity_id, IdentityStatus::Blocked).await?;
        self.repo.save_session(identity_id, None).await?;
        info!(%identity_id, "identity blocked");
        Ok(Identity {
            session: None,
            ..identity
        })
    }

    pub async fn unblock(&self, identity_id: Uuid) -> GateResult<Identity> {
        let _guard = self.locks.lock(identity_id).await;
        let identity = self.set_status(identity_id, IdentityStatus::Active).await?;
        info!(%identity_id, "identity unblocked");
        Ok(identity)
    }

    /// Soft-delete an identity. Terminal.
    pub async fn remove(&self, identity_id: Uuid) -> GateResult<()> {
        let _guard = self.locks.lock(identity_id).await;
        self.repo.remove(identity_id).await?;
        info!(%identity_id, "identity removed");
        Ok(())
    }

    async fn set_status(&self, identity_id: Uuid, status: IdentityStatus) -> GateResult<Identity> {
        let current = self.repo.get_by_id(identity_id).await?;
        if current.status == IdentityStatus::Removed {
            return Err(GateError::Validation {
                message: "identity has been removed".into(),
            });
        }
        self.repo.update_status(identity_id, status).await
    }
}

fn normalize_email(raw: &str) -> GateResult<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(email)
        }
        _ => Err(GateError::Validation {
            message: "invalid email address".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(
            normalize_email("  Ada@Example.COM ").unwrap(),
            "ada@example.com"
        );
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["", "ada", "@example.com", "ada@", "a@b@c"] {
            assert!(
                matches!(normalize_email(bad), Err(GateError::Validation { .. })),
                "{bad} should be rejected"
            );
        }
    }
}
