use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session cookie. Register and login set the cookie,
/// logout expires it.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness only: answers without touching the store.
        .route("/health", get(|| async { "ok" }))
        // GET /api/ping
        // Store connectivity probe, reports the user count.
        .route("/api/ping", get(handlers::ping))
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
}
