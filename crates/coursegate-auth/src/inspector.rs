//! Read-only administrative view of live sessions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use coursegate_core::error::GateResult;
use coursegate_core::repository::{IdentityRepository, Pagination, ScanKey};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSessionView {
    pub identity_id: Uuid,
    pub email: String,
    pub device_description: String,
    pub login_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub source_address: Option<String>,
    pub location: Option<String>,
}

pub struct SessionInspector<R> {
    repo: Arc<R>,
    page_size: u64,
}

impl<R: IdentityRepository> SessionInspector<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            page_size: Pagination::default().limit,
        }
    }

    /// Every identity that currently holds a session, oldest identity
    /// first. Fingerprints and secret digests are not exposed.
    pub async fn list_active_sessions(&self) -> GateResult<Vec<ActiveSessionView>> {
        let mut views = Vec::new();
        let mut after = None;

        loop {
            let page = self.repo.scan_online(after, self.page_size).await?;
            after = ScanKey::after_page(&page, self.page_size);
            views.extend(page.into_iter().filter_map(|identity| {
                let session = identity.session?;
                Some(ActiveSessionView {
                    identity_id: identity.id,
                    email: identity.email,
                    device_description: session.device_description,
                    login_at: session.login_at,
                    last_activity_at: session.last_activity_at,
                    source_address: session.source_address,
                    location: session.location,
                })
            }));
            if after.is_none() {
                return Ok(views);
            }
        }
    }
}
