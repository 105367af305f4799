//! Time-bounded course entitlements.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

/// Upper bound of the progress percentage.
pub const MAX_PROGRESS: u8 = 100;

/// Access to one course for a finite window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub course_ref: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Cached `now > expires_at`, refreshed by sweeps. Never the source
    /// of truth for a single access check.
    pub expired: bool,
    pub progress: u8,
}

impl Entitlement {
    pub fn new(course_ref: impl Into<String>, granted_at: DateTime<Utc>, window: Duration) -> Self {
        Self {
            course_ref: course_ref.into(),
            granted_at,
            expires_at: granted_at + window,
            expired: false,
            progress: 0,
        }
    }

    /// Live check: the cached flag or the timestamp, whichever says so
    /// first.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.expired || now > self.expires_at
    }

    /// Flip the cached flag if the window has passed. Returns whether the
    /// flag changed.
    pub fn mark_expired_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if !self.expired && now > self.expires_at {
            self.expired = true;
            true
        } else {
            false
        }
    }

    /// Advance `expires_at` by `months` from its current value and clear
    /// the expired flag.
    pub fn extend(&mut self, months: u32) -> GateResult<DateTime<Utc>> {
        if months == 0 {
            return Err(GateError::Validation {
                message: "extension must add at least one month".into(),
            });
        }
        let expires_at = self
            .expires_at
            .checked_add_months(Months::new(months))
            .ok_or_else(|| GateError::Validation {
                message: format!("cannot extend {} by {months} months", self.course_ref),
            })?;
        self.expires_at = expires_at;
        self.expired = false;
        Ok(expires_at)
    }

    /// Raise progress to `value` (clamped to 100). Lower values are
    /// ignored. Returns the stored progress.
    pub fn record_progress(&mut self, value: u8) -> u8 {
        self.progress = self.progress.max(value.min(MAX_PROGRESS));
        self.progress
    }

    /// Whole days left until expiry, rounded up. Zero once lapsed.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        let remaining = self.expires_at - now;
        if remaining <= Duration::zero() {
            return 0;
        }
        let days = remaining.num_days();
        if remaining > Duration::days(days) {
            days + 1
        } else {
            days
        }
    }
}

/// Grant window for display when a course-access check fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessWindow {
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Answer to "may this identity open this course right now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseAccess {
    pub expired: bool,
    /// `None` when the identity was never granted the course.
    pub window: Option<AccessWindow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entitlement_window() {
        let now = Utc::now();
        let e = Entitlement::new("c1", now, Duration::days(180));
        assert_eq!(e.expires_at - e.granted_at, Duration::days(180));
        assert!(!e.expired);
        assert_eq!(e.progress, 0);
    }

    #[test]
    fn lapsed_is_live_even_without_flag() {
        let now = Utc::now();
        let mut e = Entitlement::new("c1", now - Duration::days(10), Duration::days(1));
        assert!(!e.expired);
        assert!(e.is_lapsed(now));
        assert!(e.mark_expired_if_due(now));
        assert!(!e.mark_expired_if_due(now));
    }

    #[test]
    fn extend_advances_from_current_expiry() {
        let now = Utc::now();
        let mut e = Entitlement::new("c1", now - Duration::days(200), Duration::days(180));
        e.mark_expired_if_due(now);
        let before = e.expires_at;
        let after = e.extend(6).unwrap();
        assert_eq!(after, before.checked_add_months(Months::new(6)).unwrap());
        assert!(!e.expired);
    }

    #[test]
    fn extend_by_zero_is_rejected() {
        let mut e = Entitlement::new("c1", Utc::now(), Duration::days(1));
        assert!(matches!(e.extend(0), Err(GateError::Validation { .. })));
    }

    #[test]
    fn progress_never_decreases() {
        let mut e = Entitlement::new("c1", Utc::now(), Duration::days(1));
        assert_eq!(e.record_progress(40), 40);
        assert_eq!(e.record_progress(10), 40);
        assert_eq!(e.record_progress(250), 100);
    }

    #[test]
    fn days_remaining_rounds_up() {
        let now = Utc::now();
        let mut e = Entitlement::new("c1", now, Duration::hours(30));
        assert_eq!(e.days_remaining(now), 2);
        e.expires_at = now + Duration::days(7);
        assert_eq!(e.days_remaining(now), 7);
        e.expires_at = now - Duration::seconds(1);
        assert_eq!(e.days_remaining(now), 0);
    }
}
