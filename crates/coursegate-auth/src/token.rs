//! JWT access token issuance/verification and opaque session secrets.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// JWT claims embedded in every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject: identity ID (UUID string).
    pub sub: String,
    pub iss: String,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Unique token ID (UUID string).
    pub jti: String,
    /// Session the token was issued for (UUID string).
    pub sid: String,
}

impl AccessTokenClaims {
    pub fn identity_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub)
            .map_err(|e| AuthError::TokenInvalid(format!("bad subject: {e}")))
    }

    pub fn session_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sid)
            .map_err(|e| AuthError::TokenInvalid(format!("bad session id: {e}")))
    }
}

/// Issue a signed EdDSA (Ed25519) JWT access token bound to one session
/// of an identity.
pub fn issue_access_token(
    identity_id: Uuid,
    session_id: Uuid,
    issued_at: DateTime<Utc>,
    config: &AuthConfig,
) -> Result<String, AuthError> {
    let now = issued_at.timestamp();
    let claims = AccessTokenClaims {
        sub: identity_id.to_string(),
        iss: config.jwt_issuer.clone(),
        iat: now,
        exp: now + config.access_token_lifetime_secs as i64,
        jti: Uuid::new_v4().to_string(),
        sid: session_id.to_string(),
    };

    let key = EncodingKey::from_ed_pem(config.jwt_private_key_pem.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("bad private key: {e}")))?;

    jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), &claims, &key)
        .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
}

/// Decode and verify an EdDSA JWT access token (signature, issuer).
///
/// Expiry is checked against `now` rather than the system time, so the
/// token lifetime runs on the same clock that stamped `iat` and `exp`.
/// A token is expired from its `exp` second onwards.
pub fn decode_access_token(
    token: &str,
    now: DateTime<Utc>,
    config: &AuthConfig,
) -> Result<AccessTokenClaims, AuthError> {
    let key = DecodingKey::from_ed_pem(config.jwt_public_key_pem.as_bytes())
        .map_err(|e| AuthError::Crypto(format!("bad public key: {e}")))?;

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_issuer(&[&config.jwt_issuer]);
    validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);
    validation.validate_exp = false;

    let claims = jsonwebtoken::decode::<AccessTokenClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::TokenInvalid(e.to_string()))?;

    if now.timestamp() >= claims.exp {
        return Err(AuthError::TokenExpired);
    }
    Ok(claims)
}

/// Generate a random opaque session secret
/// (32 bytes → base64url-encoded, no padding).
pub fn generate_session_secret() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 of a raw session secret, hex-encoded. Only this digest is
/// persisted on the session.
pub fn hash_session_secret(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
