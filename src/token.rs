use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Role;

/// Lifetime of every session token.
pub const TOKEN_TTL_SECS: i64 = 15 * 60;

/// Claims
///
/// The signed claim set carried in the `token` cookie. Nothing about the session is
/// persisted server-side: whoever holds a correctly signed, unexpired claim set is
/// the user named by `id`, with the role named by `role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: `users.id` of the session owner.
    pub id: Uuid,
    /// Role at the time of issuance.
    pub role: Role,
    /// Issued At, seconds since the epoch.
    pub iat: i64,
    /// Expiration, always `iat + TOKEN_TTL_SECS`.
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("malformed token")]
    Malformed,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// TokenCodec
///
/// Signs and verifies session tokens (HS256) with the symmetric secret from `AppConfig`.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issues a token for `id`/`role` that expires 15 minutes from now.
    pub fn sign(&self, id: Uuid, role: Role) -> Result<String, TokenError> {
        self.sign_at(id, role, Utc::now())
    }

    /// Issues a token as if the current instant were `issued_at`.
    pub fn sign_at(
        &self,
        id: Uuid,
        role: Role,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let iat = issued_at.timestamp();
        let claims = Claims {
            id,
            role,
            iat,
            exp: (issued_at + Duration::seconds(TOKEN_TTL_SECS)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Checks signature and expiry.
    ///
    /// Never panics: every malformed, mis-signed or expired input comes back as a
    /// `TokenError`, which every caller treats exactly like a missing token.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        // Expiry is exact: a token is dead the second its 15 minutes are over.
        validation.leeway = 0;
        validation.reject_tokens_expiring_in_less_than = 1;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            })
    }
}
