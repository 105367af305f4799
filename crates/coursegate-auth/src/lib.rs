//! Coursegate Auth: credential verification, device-bound sessions,
//! course entitlements and their periodic maintenance.

pub mod config;
pub mod entitlements;
pub mod error;
pub mod fingerprint;
pub mod inspector;
pub mod locks;
pub mod notify;
pub mod password;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod token;

pub use config::{AuthConfig, SchedulerConfig};
pub use entitlements::{EntitlementService, EntitlementSummary, Sweep};
pub use error::AuthError;
pub use inspector::{ActiveSessionView, SessionInspector};
pub use locks::IdentityLocks;
pub use notify::{ChannelNotifier, ExpiryNotifier, TracingNotifier};
pub use scheduler::{CleanupReport, ExpiryScheduler, SchedulerHandle, SweepReport, WarningReport};
pub use service::{
    AuthService, LoginInput, LoginOutcome, LoginOutput, RefreshOutput, RegisterInput,
};
pub use session::{DeviceLogin, SessionManager, SessionStart};
pub use token::AccessTokenClaims;
