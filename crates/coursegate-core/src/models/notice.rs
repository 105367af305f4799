//! Expiry notices handed to the notification collaborator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Expires within the urgent window (default one day).
    Urgent,
    /// Expires within the upcoming window but after the urgent one.
    Upcoming,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpiryNotice {
    pub identity_id: Uuid,
    /// Contact address of the identity (its email).
    pub contact: String,
    pub course_ref: String,
    pub days_remaining: i64,
    pub urgency: Urgency,
}
