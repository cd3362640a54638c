use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    auth::{Access, Requirement, authorize},
    models::Role,
    session,
    token::TokenCodec,
};

pub const LOGIN_PATH: &str = "/login";
pub const FORBIDDEN_PATH: &str = "/forbidden";

/// Outcome of the page-route gate for one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    RedirectToLogin,
    RedirectToForbidden,
}

fn is_under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Which UI paths the gate protects, and with what requirement.
/// API paths (`/api/...`) are never matched: their handlers check for themselves.
fn requirement_for(path: &str) -> Option<Requirement> {
    if is_under(path, "/admin") {
        Some(Requirement::Role(Role::Admin))
    } else if path == "/dashboard" || is_under(path, "/user") {
        Some(Requirement::Authenticated)
    } else {
        None
    }
}

/// gate
///
/// Decides a navigation to `path` given the raw session token, if any.
pub fn gate(path: &str, token: Option<&str>, codec: &TokenCodec) -> GateDecision {
    let Some(requirement) = requirement_for(path) else {
        return GateDecision::Allow;
    };

    match authorize(token, codec, requirement) {
        Access::Granted(_) => GateDecision::Allow,
        Access::Unauthenticated => GateDecision::RedirectToLogin,
        Access::Forbidden => GateDecision::RedirectToForbidden,
    }
}

/// page_gate
///
/// Middleware applied to the whole router. Blocks navigation to protected UI pages
/// before any page logic runs; everything else passes through untouched.
pub async fn page_gate(State(codec): State<TokenCodec>, request: Request, next: Next) -> Response {
    let token = session::read_token(request.headers());
    match gate(request.uri().path(), token.as_deref(), &codec) {
        GateDecision::Allow => next.run(request).await,
        GateDecision::RedirectToLogin => {
            tracing::debug!(path = %request.uri().path(), "page gate: no valid session");
            Redirect::temporary(LOGIN_PATH).into_response()
        }
        GateDecision::RedirectToForbidden => {
            tracing::debug!(path = %request.uri().path(), "page gate: admin role required");
            Redirect::temporary(FORBIDDEN_PATH).into_response()
        }
    }
}
