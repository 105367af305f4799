//! Time-bound course entitlements.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use coursegate_core::clock::Clock;
use coursegate_core::error::{GateError, GateResult};
use coursegate_core::models::entitlement::{CourseAccess, Entitlement};
use coursegate_core::repository::IdentityRepository;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::locks::IdentityLocks;

/// Outcome of sweeping one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sweep {
    pub newly_expired: usize,
}

impl Sweep {
    pub fn changed(&self) -> bool {
        self.newly_expired > 0
    }
}

/// Live and lapsed courses of an identity, as shown after login.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntitlementSummary {
    pub active: Vec<Entitlement>,
    pub expired: Vec<String>,
}

pub struct EntitlementService<R> {
    repo: Arc<R>,
    locks: Arc<IdentityLocks>,
    clock: Arc<dyn Clock>,
    config: Arc<AuthConfig>,
}

impl<R> Clone for EntitlementService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            locks: Arc::clone(&self.locks),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
        }
    }
}

impl<R: IdentityRepository> EntitlementService<R> {
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

    /// Grant access to a course for the default window.
    pub async fn grant(&self, identity_id: Uuid, course_ref: &str) -> GateResult<Entitlement> {
        self.grant_for(identity_id, course_ref, self.config.default_entitlement_window())
            .await
    }

    /// Grant access to a course for `window`, starting now.
    ///
    /// Fails with `AlreadyGranted` while an earlier grant is still live; a
    /// lapsed grant is replaced and keeps its progress.
    pub async fn grant_for(
        &self,
        identity_id: Uuid,
        course_ref: &str,
        window: Duration,
    ) -> GateResult<Entitlement> {
        if course_ref.trim().is_empty() {
            return Err(GateError::Validation {
                message: "course reference must not be empty".into(),
            });
        }

        let _guard = self.locks.lock(identity_id).await;
        let mut identity = self.repo.get_by_id(identity_id).await?;
        let granted = identity
            .grant(course_ref, window, self.clock.now())?
            .clone();

        self.repo
            .save_entitlements(identity_id, identity.entitlements)
            .await?;
        info!(
            %identity_id,
            course_ref,
            expires_at = %granted.expires_at,
            "entitlement granted"
        );
        Ok(granted)
    }

    /// True when the course was never granted or its window has passed.
    /// Evaluated against the clock, never the cached flag alone.
    pub async fn is_expired(&self, identity_id: Uuid, course_ref: &str) -> GateResult<bool> {
        let identity = self.repo.get_by_id(identity_id).await?;
        Ok(identity.is_expired(course_ref, self.clock.now()))
    }

    pub async fn check_access(&self, identity_id: Uuid, course_ref: &str) -> GateResult<CourseAccess> {
        let identity = self.repo.get_by_id(identity_id).await?;
        Ok(identity.course_access(course_ref, self.clock.now()))
    }

    pub async fn list_active(&self, identity_id: Uuid) -> GateResult<Vec<Entitlement>> {
        let identity = self.repo.get_by_id(identity_id).await?;
        Ok(identity
            .active_entitlements(self.clock.now())
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn summary(&self, identity_id: Uuid) -> GateResult<EntitlementSummary> {
        let identity = self.repo.get_by_id(identity_id).await?;
        let now = self.clock.now();
        let (active, lapsed): (Vec<_>, Vec<_>) = identity
            .entitlements
            .into_iter()
            .partition(|e| !e.is_lapsed(now));

        Ok(EntitlementSummary {
            active,
            expired: lapsed.into_iter().map(|e| e.course_ref).collect(),
        })
    }

    /// Extend by the default number of months.
    pub async fn extend(&self, identity_id: Uuid, course_ref: &str) -> GateResult<DateTime<Utc>> {
        self.extend_by(identity_id, course_ref, self.config.default_extension_months)
            .await
    }

    /// Push the expiry out by `months` calendar months from its current
    /// value and clear the expired flag. Returns the new expiry.
    pub async fn extend_by(
        &self,
        identity_id: Uuid,
        course_ref: &str,
        months: u32,
    ) -> GateResult<DateTime<Utc>> {
        let _guard = self.locks.lock(identity_id).await;
        let mut identity = self.repo.get_by_id(identity_id).await?;
        let expires_at = identity.extend_entitlement(course_ref, months)?;

        self.repo
            .save_entitlements(identity_id, identity.entitlements)
            .await?;
        info!(%identity_id, course_ref, months, %expires_at, "entitlement extended");
        Ok(expires_at)
    }

    /// Flag every entitlement of the identity whose window has passed.
    /// Persists only when something changed.
    pub async fn sweep_expired(&self, identity_id: Uuid) -> GateResult<Sweep> {
        let _guard = self.locks.lock(identity_id).await;
        let mut identity = self.repo.get_by_id(identity_id).await?;
        let newly_expired = identity.sweep_expired(self.clock.now());

        if newly_expired > 0 {
            self.repo
                .save_entitlements(identity_id, identity.entitlements)
                .await?;
            info!(%identity_id, newly_expired, "entitlements flagged expired");
        }
        Ok(Sweep { newly_expired })
    }

    /// Record course progress. Values above 100 are clamped and progress
    /// never moves backwards. Returns the stored value.
    pub async fn record_progress(
        &self,
        identity_id: Uuid,
        course_ref: &str,
        value: u8,
    ) -> GateResult<u8> {
        let _guard = self.locks.lock(identity_id).await;
        let mut identity = self.repo.get_by_id(identity_id).await?;
        let stored = identity.record_progress(course_ref, value)?;

        self.repo
            .save_entitlements(identity_id, identity.entitlements)
            .await?;
        Ok(stored)
    }
}
