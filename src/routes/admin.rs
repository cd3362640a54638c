use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch},
};

/// Admin Router Module
///
/// The review queue. Mounted at `/api/admin`; every handler extracts an `AdminSession`
/// (401 without a valid token, 403 for a non-admin one).
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/requests", get(handlers::admin_list_requests))
        .route("/requests/{id}", get(handlers::admin_get_request))
        // PATCH /api/admin/requests/{id}/status
        // ISSUED renders and stores the certificate before the row is updated.
        .route(
            "/requests/{id}/status",
            patch(handlers::admin_update_status),
        )
        // Attachment for review, whatever the status.
        .route(
            "/requests/{id}/download",
            get(handlers::admin_download_attachment),
        )
}
