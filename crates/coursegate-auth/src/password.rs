//! Credential hashing and verification using Argon2id.
//!
//! Both operations are CPU-bound; async callers run them on the blocking
//! pool (see [`crate::service::AuthService`]).

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::AuthError;

fn peppered(secret: &str, pepper: Option<&str>) -> Vec<u8> {
    match pepper {
        Some(p) => format!("{p}{secret}").into_bytes(),
        None => secret.as_bytes().to_vec(),
    }
}

/// Hash a secret into an Argon2id PHC string with a fresh random salt.
///
/// The configured pepper, if any, is prepended before hashing and must be
/// supplied again on verification.
pub fn hash_password(secret: &str, config: &AuthConfig) -> Result<String, AuthError> {
    let params = Params::new(
        config.argon2_memory_kib,
        config.argon2_iterations,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| AuthError::Crypto(format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);

    argon2
        .hash_password(&peppered(secret, config.pepper.as_deref()), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Crypto(format!("hash error: {e}")))
}

/// Check a candidate secret against a stored PHC digest.
///
/// Never fails: a malformed digest or any verifier error counts as a
/// mismatch. Cost parameters are read from the digest itself.
pub fn verify_password(candidate: &str, digest: &str, pepper: Option<&str>) -> bool {
    let parsed = match argon2::PasswordHash::new(digest) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "stored credential digest is malformed");
            return false;
        }
    };

    Argon2::default()
        .verify_password(&peppered(candidate, pepper), &parsed)
        .is_ok()
}
