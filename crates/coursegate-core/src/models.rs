//! Domain models for Coursegate.
//!
//! The [`identity::Identity`] aggregate owns its session and its
//! entitlements; nothing else has an independent lifetime.

pub mod device;
pub mod entitlement;
pub mod identity;
pub mod notice;
pub mod session;
