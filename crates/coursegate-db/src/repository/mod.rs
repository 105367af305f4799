//! SurrealDB repository implementations.

mod identity;

pub use identity::SurrealIdentityRepository;
