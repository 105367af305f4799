//! Coursegate Database: SurrealDB connection management and the identity
//! repository.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Error types ([`DbError`])
//! - [`repository::SurrealIdentityRepository`], the SurrealDB
//!   implementation of `coursegate_core::repository::IdentityRepository`

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use repository::SurrealIdentityRepository;
pub use schema::{latest_version, run_migrations};
