//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Writes to the embedded session and
//! entitlement sub-documents replace them wholesale; callers serialize
//! read-modify-write cycles per identity.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::GateResult;
use crate::models::entitlement::Entitlement;
use crate::models::identity::{CreateIdentity, Identity, IdentityStatus};
use crate::models::session::Session;

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl<T> PaginatedResult<T> {
    /// Pagination for the page after this one, if there is one.
    pub fn next_page(&self) -> Option<Pagination> {
        let next = self.offset + self.items.len() as u64;
        (!self.items.is_empty() && next < self.total).then_some(Pagination {
            offset: next,
            limit: self.limit,
        })
    }
}

/// Resume position of a keyset scan: the `(created_at, id)` of the last
/// identity already seen. Scans order by that pair, so inserts and
/// filter changes on earlier identities never shift later pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanKey {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl ScanKey {
    pub fn of(identity: &Identity) -> Self {
        Self {
            created_at: identity.created_at,
            id: identity.id,
        }
    }

    /// Key to resume after `page`, or `None` when the page was the last.
    pub fn after_page(page: &[Identity], limit: u64) -> Option<Self> {
        if (page.len() as u64) < limit {
            return None;
        }
        page.last().map(Self::of)
    }
}

pub trait IdentityRepository: Send + Sync {
    /// Fails with `AlreadyExists` when the email is taken.
    fn create(&self, input: CreateIdentity) -> impl Future<Output = GateResult<Identity>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = GateResult<Identity>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = GateResult<Identity>> + Send;
    fn update_status(
        &self,
        id: Uuid,
        status: IdentityStatus,
    ) -> impl Future<Output = GateResult<Identity>> + Send;
    /// `None` clears the session.
    fn save_session(
        &self,
        id: Uuid,
        session: Option<Session>,
    ) -> impl Future<Output = GateResult<()>> + Send;
    fn save_entitlements(
        &self,
        id: Uuid,
        entitlements: Vec<Entitlement>,
    ) -> impl Future<Output = GateResult<()>> + Send;
    /// Terminal soft-delete: status becomes `Removed`, the email is
    /// rewritten so it can be registered again, and the session is cleared.
    fn remove(&self, id: Uuid) -> impl Future<Output = GateResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = GateResult<PaginatedResult<Identity>>> + Send;
    /// Identities holding at least one entitlement, ordered by
    /// `(created_at, id)`, strictly after `after`.
    fn scan_with_entitlements(
        &self,
        after: Option<ScanKey>,
        limit: u64,
    ) -> impl Future<Output = GateResult<Vec<Identity>>> + Send;
    /// Identities that currently have a session, ordered by
    /// `(created_at, id)`, strictly after `after`.
    fn scan_online(
        &self,
        after: Option<ScanKey>,
        limit: u64,
    ) -> impl Future<Output = GateResult<Vec<Identity>>> + Send;
}
