use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::get,
};

// Room for the multipart boundaries and text parts around a maximum-size attachment.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Authenticated Router Module
///
/// Routes for any signed-in user. Every handler here extracts a `Session`, so a request
/// without a valid `token` cookie is answered 401 before the handler body runs.
///
/// Ownership is checked inside the handlers: a request that exists but belongs to
/// someone else is 403, never 404.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/api/auth/me", get(handlers::me))
        // GET lists the caller's requests, POST submits a new one (multipart).
        .route(
            "/api/requests",
            get(handlers::list_my_requests).post(handlers::create_request).layer(
                DefaultBodyLimit::max(handlers::MAX_ATTACHMENT_BYTES + FORM_OVERHEAD_BYTES),
            ),
        )
        .route("/api/requests/{id}", get(handlers::get_my_request))
        // Original attachment, only once the request is ISSUED.
        .route(
            "/api/requests/{id}/download",
            get(handlers::download_my_attachment),
        )
        .route(
            "/api/requests/{id}/certificate",
            get(handlers::download_my_certificate),
        )
}
