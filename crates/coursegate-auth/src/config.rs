//! Authentication, session and scheduler configuration.

use std::time::Duration as StdDuration;

use chrono::Duration;

/// Configuration for the authentication, session and entitlement services.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for JWT signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for JWT verification.
    pub jwt_public_key_pem: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Optional pepper prepended to secrets before Argon2id hashing.
    pub pepper: Option<String>,
    /// Minimum secret length accepted at registration.
    pub min_password_length: usize,
    /// Argon2id memory cost in KiB (default: 19456 = 19 MiB).
    pub argon2_memory_kib: u32,
    /// Argon2id iteration count (default: 2).
    pub argon2_iterations: u32,
    /// Argon2id lanes (default: 1).
    pub argon2_parallelism: u32,
    /// Idle time after which a session stops blocking logins from other
    /// devices and fails validation (default: 1800 = 30 minutes).
    pub inactivity_timeout_secs: u64,
    /// Idle time after which the periodic cleanup clears a session
    /// (default: 3600 = 1 hour).
    pub idle_cleanup_threshold_secs: u64,
    /// Access window of a new entitlement in days (default: 180).
    pub default_entitlement_days: u32,
    /// Months added by an extension when none are given (default: 6).
    pub default_extension_months: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            access_token_lifetime_secs: 900,
            jwt_issuer: "coursegate".into(),
            pepper: None,
            min_password_length: 8,
            argon2_memory_kib: 19_456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
            inactivity_timeout_secs: 1_800,
            idle_cleanup_threshold_secs: 3_600,
            default_entitlement_days: 180,
            default_extension_months: 6,
        }
    }
}

impl AuthConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::seconds(self.inactivity_timeout_secs as i64)
    }

    pub fn idle_cleanup_threshold(&self) -> Duration {
        Duration::seconds(self.idle_cleanup_threshold_secs as i64)
    }

    pub fn default_entitlement_window(&self) -> Duration {
        Duration::days(i64::from(self.default_entitlement_days))
    }
}

/// Timers and windows of the expiry scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often expired entitlements are flagged (default: daily).
    pub sweep_interval: StdDuration,
    /// How often expiry warnings are produced (default: daily).
    pub warning_interval: StdDuration,
    /// How often long-idle sessions are cleared (default: hourly).
    pub session_cleanup_interval: StdDuration,
    /// Entitlements expiring within this many days are urgent.
    pub urgent_window_days: i64,
    /// Entitlements expiring within this many days get an upcoming notice.
    pub upcoming_window_days: i64,
    /// Identities fetched per repository page during scans.
    pub page_size: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: StdDuration::from_secs(24 * 60 * 60),
            warning_interval: StdDuration::from_secs(24 * 60 * 60),
            session_cleanup_interval: StdDuration::from_secs(60 * 60),
            urgent_window_days: 1,
            upcoming_window_days: 7,
            page_size: 100,
        }
    }
}
