use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::Role,
    session,
    token::{Claims, TokenCodec},
};

/// What a route demands of the caller's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Any valid, unexpired token.
    Authenticated,
    /// A valid token whose role is `ADMIN`.
    Role(Role),
}

/// Access
///
/// Typed outcome of the access guard. Invalid, expired and tampered tokens all collapse
/// into `Unauthenticated`, indistinguishable from a request with no cookie at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Unauthenticated,
    Forbidden,
    Granted(Claims),
}

/// authorize
///
/// The single guard shared by the API extractors and the page-route middleware:
/// verify the token, then check the role if one is required.
pub fn authorize(token: Option<&str>, codec: &TokenCodec, requirement: Requirement) -> Access {
    let Some(token) = token else {
        return Access::Unauthenticated;
    };

    let claims = match codec.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!("rejected session token: {}", e);
            return Access::Unauthenticated;
        }
    };

    match requirement {
        Requirement::Role(role) if claims.role != role => Access::Forbidden,
        _ => Access::Granted(claims),
    }
}

impl Access {
    /// Maps the outcome onto the API error kinds (401 / 403).
    pub fn into_result(self) -> Result<Claims, AppError> {
        match self {
            Access::Granted(claims) => Ok(claims),
            Access::Forbidden => Err(AppError::Forbidden),
            Access::Unauthenticated => Err(AppError::Unauthenticated),
        }
    }
}

fn guard<S>(parts: &Parts, state: &S, requirement: Requirement) -> Result<Claims, AppError>
where
    TokenCodec: FromRef<S>,
{
    let codec = TokenCodec::from_ref(state);
    let token = session::read_token(&parts.headers);
    authorize(token.as_deref(), &codec, requirement).into_result()
}

/// Session
///
/// Extractor for any authenticated API route. Rejects with 401 before the handler runs
/// when the `token` cookie is missing or fails verification.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub role: Role,
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    TokenCodec: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = guard(parts, state, Requirement::Authenticated)?;
        Ok(Session {
            id: claims.id,
            role: claims.role,
        })
    }
}

/// AdminSession
///
/// Extractor for admin API routes: 401 without a valid token, 403 when the token's
/// role is not `ADMIN`. API routes re-check here regardless of the page gate.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub id: Uuid,
}

impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
    TokenCodec: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = guard(parts, state, Requirement::Role(Role::Admin))?;
        Ok(AdminSession { id: claims.id })
    }
}
