//! SurrealDB implementation of [`IdentityRepository`].
//!
//! The session and the entitlement list live inside the identity record
//! as sub-documents. Each save replaces the whole sub-document; the auth
//! layer serializes read-modify-write cycles per identity.

use coursegate_core::error::GateResult;
use coursegate_core::models::entitlement::Entitlement;
use coursegate_core::models::identity::{CreateIdentity, Identity, IdentityStatus};
use coursegate_core::models::session::Session;
use coursegate_core::repository::{IdentityRepository, PaginatedResult, Pagination, ScanKey};
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Embedded session sub-document.
#[derive(Debug, SurrealValue)]
struct SessionDoc {
    session_id: String,
    device_fingerprint: String,
    device_description: String,
    login_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    source_address: Option<String>,
    location: Option<String>,
    secret_hash: String,
}

impl From<Session> for SessionDoc {
    fn from(s: Session) -> Self {
        Self {
            session_id: s.session_id.to_string(),
            device_fingerprint: s.device_fingerprint,
            device_description: s.device_description,
            login_at: s.login_at,
            last_activity_at: s.last_activity_at,
            source_address: s.source_address,
            location: s.location,
            secret_hash: s.secret_hash,
        }
    }
}

impl TryFrom<SessionDoc> for Session {
    type Error = DbError;

    fn try_from(d: SessionDoc) -> Result<Self, DbError> {
        let session_id = Uuid::parse_str(&d.session_id)
            .map_err(|e| DbError::Corrupt(format!("invalid session id: {e}")))?;
        Ok(Self {
            session_id,
            device_fingerprint: d.device_fingerprint,
            device_description: d.device_description,
            login_at: d.login_at,
            last_activity_at: d.last_activity_at,
            source_address: d.source_address,
            location: d.location,
            secret_hash: d.secret_hash,
        })
    }
}

/// Embedded entitlement sub-document.
#[derive(Debug, SurrealValue)]
struct EntitlementDoc {
    course_ref: String,
    granted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    expired: bool,
    progress: u32,
}

impl From<Entitlement> for EntitlementDoc {
    fn from(e: Entitlement) -> Self {
        Self {
            course_ref: e.course_ref,
            granted_at: e.granted_at,
            expires_at: e.expires_at,
            expired: e.expired,
            progress: u32::from(e.progress),
        }
    }
}

impl TryFrom<EntitlementDoc> for Entitlement {
    type Error = DbError;

    fn try_from(d: EntitlementDoc) -> Result<Self, DbError> {
        let progress = u8::try_from(d.progress)
            .map_err(|_| DbError::Corrupt(format!("progress out of range: {}", d.progress)))?;
        Ok(Self {
            course_ref: d.course_ref,
            granted_at: d.granted_at,
            expires_at: d.expires_at,
            expired: d.expired,
            progress,
        })
    }
}

/// DB-side row struct including the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct IdentityRow {
    record_id: String,
    email: String,
    display_name: String,
    password_hash: String,
    status: String,
    session: Option<SessionDoc>,
    entitlements: Vec<EntitlementDoc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_status(s: &str) -> Result<IdentityStatus, DbError> {
    match s {
        "Active" => Ok(IdentityStatus::Active),
        "Blocked" => Ok(IdentityStatus::Blocked),
        "Removed" => Ok(IdentityStatus::Removed),
        other => Err(DbError::Corrupt(format!("unknown identity status: {other}"))),
    }
}

fn status_to_string(s: IdentityStatus) -> &'static str {
    match s {
        IdentityStatus::Active => "Active",
        IdentityStatus::Blocked => "Blocked",
        IdentityStatus::Removed => "Removed",
    }
}

impl IdentityRow {
    fn try_into_identity(self) -> Result<Identity, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Corrupt(format!("invalid UUID: {e}")))?;
        let entitlements = self
            .entitlements
            .into_iter()
            .map(Entitlement::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let session = self.session.map(Session::try_from).transpose()?;
        Ok(Identity {
            id,
            email: self.email,
            display_name: self.display_name,
            password_hash: self.password_hash,
            status: parse_status(&self.status)?,
            session,
            entitlements,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Map a statement error, recognising unique-index violations.
fn statement_error(err: surrealdb::Error) -> DbError {
    let message = err.to_string();
    if message.contains("already contains") {
        DbError::Duplicate {
            entity: "identity".into(),
        }
    } else {
        DbError::Query(message)
    }
}

/// `UPDATE` on a missing record returns no rows instead of failing.
fn ensure_updated(rows: Vec<surrealdb_types::Value>, id: Uuid) -> Result<(), DbError> {
    if rows.is_empty() {
        return Err(DbError::NotFound {
            entity: "identity".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Email a removed identity is parked under so the original address can
/// be registered again.
fn removed_email(id: Uuid, email: &str) -> String {
    format!("removed+{id}+{email}")
}

const IDENTITY_PROJECTION: &str = "SELECT meta::id(id) AS record_id, * FROM identity";

/// SurrealDB implementation of the Identity repository.
#[derive(Clone)]
pub struct SurrealIdentityRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealIdentityRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Paginated listing with an optional `WHERE` clause.
    async fn list_where(
        &self,
        condition: Option<&str>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<Identity>, DbError> {
        let filter = condition
            .map(|c| format!(" WHERE {c}"))
            .unwrap_or_default();

        let mut count_result = self
            .db
            .query(&format!(
                "SELECT count() AS total FROM identity{filter} GROUP ALL"
            ))
            .await?;
        let count_rows: Vec<CountRow> = count_result.take(0)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(&format!(
                "{IDENTITY_PROJECTION}{filter} \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset"
            ))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await?;

        let rows: Vec<IdentityRow> = result.take(0)?;
        let items = rows
            .into_iter()
            .map(IdentityRow::try_into_identity)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    /// Keyset scan over `condition`, ordered by `(created_at, id)`.
    async fn scan_where(
        &self,
        condition: &str,
        after: Option<ScanKey>,
        limit: u64,
    ) -> Result<Vec<Identity>, DbError> {
        let mut result = match after {
            None => {
                self.db
                    .query(&format!(
                        "{IDENTITY_PROJECTION} WHERE {condition} \
                         ORDER BY created_at ASC, record_id ASC \
                         LIMIT $limit"
                    ))
                    .bind(("limit", limit))
                    .await?
            }
            Some(key) => {
                self.db
                    .query(&format!(
                        "{IDENTITY_PROJECTION} WHERE {condition} \
                         AND (created_at > $after_at \
                              OR (created_at = $after_at AND meta::id(id) > $after_id)) \
                         ORDER BY created_at ASC, record_id ASC \
                         LIMIT $limit"
                    ))
                    .bind(("after_at", key.created_at))
                    .bind(("after_id", key.id.to_string()))
                    .bind(("limit", limit))
                    .await?
            }
        };

        let rows: Vec<IdentityRow> = result.take(0)?;
        rows.into_iter()
            .map(IdentityRow::try_into_identity)
            .collect()
    }
}

impl<C: Connection> IdentityRepository for SurrealIdentityRepository<C> {
    async fn create(&self, input: CreateIdentity) -> GateResult<Identity> {
        let id = Uuid::new_v4();

        let result = self
            .db
            .query(
                "CREATE type::record('identity', $id) SET \
                 email = $email, \
                 display_name = $display_name, \
                 password_hash = $password_hash, \
                 status = 'Active', \
                 session = NONE, \
                 entitlements = []",
            )
            .bind(("id", id.to_string()))
            .bind(("email", input.email))
            .bind(("display_name", input.display_name))
            .bind(("password_hash", input.password_hash))
            .await
            .map_err(DbError::from)?;

        result.check().map_err(statement_error)?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> GateResult<Identity> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('identity', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdentityRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "identity".into(),
            id: id_str,
        })?;

        Ok(row.try_into_identity()?)
    }

    async fn get_by_email(&self, email: &str) -> GateResult<Identity> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM identity WHERE email = $email")
            .bind(("email", email.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdentityRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "identity".into(),
            id: format!("email={email}"),
        })?;

        Ok(row.try_into_identity()?)
    }

    async fn update_status(&self, id: Uuid, status: IdentityStatus) -> GateResult<Identity> {
        let result = self
            .db
            .query(
                "UPDATE type::record('identity', $id) SET \
                 status = $status, updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("status", status_to_string(status).to_string()))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(statement_error)?;
        ensure_updated(result.take(0).map_err(DbError::from)?, id)?;

        self.get_by_id(id).await
    }

    async fn save_session(&self, id: Uuid, session: Option<Session>) -> GateResult<()> {
        let result = self
            .db
            .query(
                "UPDATE type::record('identity', $id) SET \
                 session = $session_doc, updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("session_doc", session.map(SessionDoc::from)))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(statement_error)?;
        Ok(ensure_updated(result.take(0).map_err(DbError::from)?, id)?)
    }

    async fn save_entitlements(&self, id: Uuid, entitlements: Vec<Entitlement>) -> GateResult<()> {
        let docs: Vec<EntitlementDoc> =
            entitlements.into_iter().map(EntitlementDoc::from).collect();
        let result = self
            .db
            .query(
                "UPDATE type::record('identity', $id) SET \
                 entitlements = $entitlements, updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("entitlements", docs))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(statement_error)?;
        Ok(ensure_updated(result.take(0).map_err(DbError::from)?, id)?)
    }

    async fn remove(&self, id: Uuid) -> GateResult<()> {
        let identity = self.get_by_id(id).await?;
        if identity.status == IdentityStatus::Removed {
            return Ok(());
        }

        let result = self
            .db
            .query(
                "UPDATE type::record('identity', $id) SET \
                 status = 'Removed', email = $email, session = NONE, \
                 updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("email", removed_email(id, &identity.email)))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(statement_error)?;
        Ok(ensure_updated(result.take(0).map_err(DbError::from)?, id)?)
    }

    async fn list(&self, pagination: Pagination) -> GateResult<PaginatedResult<Identity>> {
        Ok(self.list_where(None, pagination).await?)
    }

    async fn scan_with_entitlements(
        &self,
        after: Option<ScanKey>,
        limit: u64,
    ) -> GateResult<Vec<Identity>> {
        Ok(self
            .scan_where("array::len(entitlements) > 0", after, limit)
            .await?)
    }

    async fn scan_online(&self, after: Option<ScanKey>, limit: u64) -> GateResult<Vec<Identity>> {
        Ok(self.scan_where("session != NONE", after, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_roundtrip() {
        for status in [
            IdentityStatus::Active,
            IdentityStatus::Blocked,
            IdentityStatus::Removed,
        ] {
            assert_eq!(parse_status(status_to_string(status)).unwrap(), status);
        }
        assert!(parse_status("Locked").is_err());
    }

    #[test]
    fn removed_email_keeps_original_for_audit() {
        let id = Uuid::new_v4();
        let parked = removed_email(id, "ada@example.com");
        assert!(parked.starts_with("removed+"));
        assert!(parked.ends_with("+ada@example.com"));
        assert!(parked.contains(&id.to_string()));
    }

    #[test]
    fn corrupt_progress_is_rejected() {
        let now = Utc::now();
        let doc = EntitlementDoc {
            course_ref: "c1".into(),
            granted_at: now,
            expires_at: now,
            expired: false,
            progress: 400,
        };
        assert!(Entitlement::try_from(doc).is_err());
    }
}
