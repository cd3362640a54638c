use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Session and access control.
pub mod access;
pub mod auth;
pub mod password;
pub mod session;
pub mod token;

// Core application services and components.
pub mod certificate;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod storage;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{InMemoryStorage, S3StorageClient, StorageState};
pub use token::TokenCodec;

/// ApiDoc
///
/// OpenAPI document for every `/api` route, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::ping, handlers::register, handlers::login, handlers::logout, handlers::me,
        handlers::create_request, handlers::list_my_requests, handlers::get_my_request,
        handlers::download_my_attachment, handlers::download_my_certificate,
        handlers::admin_list_requests, handlers::admin_get_request,
        handlers::admin_update_status, handlers::admin_download_attachment
    ),
    components(
        schemas(
            models::Role, models::RequestStatus, models::CertificateRequest,
            models::RequestSummary, models::AdminRequestSummary, models::AdminRequestDetail,
            models::Credentials, models::CreateRequestForm, models::StatusChangeRequest,
            models::RegisteredUser, models::UserProfile, models::CreatedRequest,
            models::StatusChangeResult, models::PingResponse, models::ErrorResponse,
        )
    ),
    tags(
        (name = "docutrack", description = "DocuTrack certificate request API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Everything a handler may need, cloned per request. Services sit behind trait
/// objects so tests can swap in the in-memory implementations.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    /// Session token codec keyed with `config.jwt_secret`.
    pub tokens: TokenCodec,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        Self {
            repo,
            storage,
            tokens: TokenCodec::new(&config.jwt_secret),
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for TokenCodec {
    fn from_ref(app_state: &AppState) -> TokenCodec {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routes, the page gate, optional UI hosting and the observability
/// layers around them.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let mut router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes())
        .nest("/api/admin", admin::admin_routes());

    // The built UI answers every path no API route claims.
    if let Some(dir) = &state.config.ui_dir {
        tracing::info!("Serving UI from {}", dir);
        router = router.fallback_service(ServeDir::new(dir));
    }

    let gate = middleware::from_fn_with_state(state.tokens.clone(), access::page_gate);

    router
        .with_state(state)
        // Runs before any page: protected UI paths redirect instead of rendering.
        .layer(gate)
        .layer(cors)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
}

/// trace_span_logger
///
/// Span for `TraceLayer`: method, uri and the `x-request-id` set by the outer layer, so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
