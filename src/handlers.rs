use crate::{
    AppState,
    auth::{AdminSession, Session},
    certificate::{CertificateContent, render_certificate},
    error::{AppError, AppResult},
    models::{
        AdminRequestDetail, AdminRequestSummary, CertificateRequest, CreateRequestForm,
        CreatedRequest, Credentials, ErrorResponse, NewCertificateRequest, PingResponse,
        RegisteredUser, RequestStatus, RequestSummary, Role, StatusChangeRequest,
        StatusChangeResult, UserProfile,
    },
    password, session,
    storage::{self, Bucket},
};
use axum::{
    Json,
    extract::{FromRequestParts, Multipart, Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

/// Largest attachment accepted by `POST /api/requests`.
pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

pub const MIN_PASSWORD_LEN: usize = 6;

// --- Extractors and helpers ---

/// RequestId
///
/// `{id}` path segment of the request routes. Anything that is not a UUID cannot name a
/// stored request, so it is answered like an unknown id.
pub struct RequestId(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map(|Path(id)| RequestId(id))
            .map_err(|_| AppError::not_found("Request not found"))
    }
}

/// is_valid_email
///
/// Basic `local@domain.tld` shape check: one `@`, no whitespace, and a dot inside the
/// domain with text on both sides.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((name, tld)) => !name.is_empty() && !tld.is_empty(),
        None => false,
    }
}

fn file_response(bytes: Vec<u8>, content_type: &'static str, file_name: String) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

async fn owned_request(
    state: &AppState,
    session: &Session,
    id: Uuid,
) -> AppResult<CertificateRequest> {
    let request = state
        .repo
        .get_request(id)
        .await?
        .ok_or_else(|| AppError::not_found("Request not found"))?;

    if request.user_id != session.id {
        tracing::warn!(request_id = %id, user_id = %session.id, "ownership check failed");
        return Err(AppError::Forbidden);
    }
    Ok(request)
}

// --- Health ---

/// ping
///
/// [Public Route] Confirms the credential store answers, reporting the user count.
#[utoipa::path(
    get,
    path = "/api/ping",
    responses(
        (status = 200, description = "Store reachable", body = PingResponse),
        (status = 500, description = "Store unreachable")
    )
)]
pub async fn ping(State(state): State<AppState>) -> Response {
    match state.repo.count_users().await {
        Ok(users) => Json(PingResponse { ok: true, users }).into_response(),
        Err(e) => {
            tracing::error!("ping failed: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "ok": false, "error": "Store unavailable" })),
            )
                .into_response()
        }
    }
}

// --- Authentication ---

/// register
///
/// [Public Route] Creates a `USER` account and starts a session for it.
///
/// The duplicate check is an exact, case-sensitive match on the stored email; a racing
/// insert that slips past it still lands on the unique constraint and answers 409.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = Credentials,
    responses(
        (status = 201, description = "Registered, session cookie set", body = RegisteredUser),
        (status = 400, description = "Invalid email or password", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> AppResult<Response> {
    let Json(Credentials { email, password }) = payload?;

    if !is_valid_email(&email) {
        return Err(AppError::validation("A valid email is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.repo.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("User already exists".to_string()));
    }

    let hash = password::hash_password_blocking(password).await?;
    let user = state.repo.create_user(&email, &hash, Role::User).await?;
    let token = state.tokens.sign(user.id, user.role)?;

    tracing::info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session::issue(&token))],
        Json(RegisteredUser {
            id: user.id,
            email: user.email,
        }),
    )
        .into_response())
}

/// login
///
/// [Public Route] Exchanges email and password for a session cookie.
/// Unknown email and wrong password produce the same 401 body.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "Logged in, session cookie set", body = UserProfile),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> AppResult<Response> {
    let Json(Credentials { email, password }) = payload?;
    if email.is_empty() || password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }

    let Some(user) = state.repo.find_user_by_email(&email).await? else {
        tracing::debug!("login for unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !password::verify_password_blocking(password, user.password_hash.clone()).await? {
        tracing::debug!(user_id = %user.id, "login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.tokens.sign(user.id, user.role)?;
    tracing::info!(user_id = %user.id, "user logged in");

    Ok((
        [(header::SET_COOKIE, session::issue(&token))],
        Json(UserProfile::from(&user)),
    )
        .into_response())
}

/// logout
///
/// [Public Route] Expires the session cookie. Idempotent: works with or without a session.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Session cookie cleared"))
)]
pub async fn logout() -> Response {
    (
        [(header::SET_COOKIE, session::clear())],
        Json(serde_json::json!({ "ok": true })),
    )
        .into_response()
}

/// me
///
/// [Authenticated Route] Resolves the session's user from the store.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 404, description = "User no longer exists", body = ErrorResponse)
    )
)]
pub async fn me(session: Session, State(state): State<AppState>) -> AppResult<Json<UserProfile>> {
    let user = state
        .repo
        .get_user(session.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(UserProfile::from(&user)))
}

// --- Request lifecycle (owner) ---

struct UploadedFile {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

const REQUIRED_TEXT_FIELDS: [&str; 5] = [
    "certificate_type",
    "first_name",
    "last_name",
    "personal_id",
    "birth_date",
];

async fn read_submission(
    mut multipart: Multipart,
) -> AppResult<(HashMap<String, String>, UploadedFile)> {
    let mut fields = HashMap::new();
    let mut attachment = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "attachment" {
            let file_name = field.file_name().unwrap_or("attachment").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::validation(e.body_text()))?;
            attachment = Some(UploadedFile {
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::validation(e.body_text()))?;
            fields.insert(name, value.trim().to_string());
        }
    }

    let mut missing: Vec<&str> = REQUIRED_TEXT_FIELDS
        .into_iter()
        .filter(|name| fields.get(*name).is_none_or(|value| value.is_empty()))
        .collect();
    let attachment = attachment.filter(|file| !file.bytes.is_empty());
    if attachment.is_none() {
        missing.push("attachment");
    }

    match attachment {
        Some(file) if missing.is_empty() => {
            if file.bytes.len() > MAX_ATTACHMENT_BYTES {
                return Err(AppError::validation("Attachment exceeds 5 MB"));
            }
            Ok((fields, file))
        }
        _ => Err(AppError::validation(format!(
            "Missing fields: {}",
            missing.join(", ")
        ))),
    }
}

/// create_request
///
/// [Authenticated Route] Submits a certificate request with its supporting document.
///
/// The attachment is stored first under `user-<id>/<millis>-<name>`; the row is only
/// inserted once the upload succeeded, always with status `RECEIVED`.
#[utoipa::path(
    post,
    path = "/api/requests",
    request_body(content = CreateRequestForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Request received", body = CreatedRequest),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn create_request(
    session: Session,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<CreatedRequest>)> {
    let (mut fields, file) = read_submission(multipart).await?;
    let mut take = |name: &str| fields.remove(name).unwrap_or_default();

    let key = storage::attachment_key(session.id, &file.file_name, Utc::now());
    state
        .storage
        .put_object(Bucket::Attachments, &key, file.bytes, &file.content_type)
        .await?;

    let created = state
        .repo
        .create_request(NewCertificateRequest {
            user_id: session.id,
            certificate_type: take("certificate_type"),
            first_name: take("first_name"),
            last_name: take("last_name"),
            personal_id: take("personal_id"),
            birth_date: take("birth_date"),
            attachment_url: Bucket::Attachments.path(&key),
        })
        .await?;

    tracing::info!(request_id = %created.id, user_id = %session.id, "certificate request received");

    Ok((
        StatusCode::CREATED,
        Json(CreatedRequest {
            id: created.id,
            status: created.status,
        }),
    ))
}

/// list_my_requests
///
/// [Authenticated Route] The caller's own requests, newest first.
#[utoipa::path(
    get,
    path = "/api/requests",
    responses(
        (status = 200, description = "Own requests", body = [RequestSummary]),
        (status = 401, description = "No valid session", body = ErrorResponse)
    )
)]
pub async fn list_my_requests(
    session: Session,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<RequestSummary>>> {
    Ok(Json(state.repo.list_requests_for_owner(session.id).await?))
}

/// get_my_request
///
/// [Authenticated Route] Full row of one of the caller's requests.
#[utoipa::path(
    get,
    path = "/api/requests/{id}",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request", body = CertificateRequest),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_my_request(
    session: Session,
    State(state): State<AppState>,
    RequestId(id): RequestId,
) -> AppResult<Json<CertificateRequest>> {
    Ok(Json(owned_request(&state, &session, id).await?))
}

/// download_my_attachment
///
/// [Authenticated Route] Streams back the caller's original document, but only once the
/// request has been issued. Stricter than `get_my_request`.
#[utoipa::path(
    get,
    path = "/api/requests/{id}/download",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Attachment bytes (application/octet-stream)"),
        (status = 403, description = "Not the owner, or not issued", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn download_my_attachment(
    session: Session,
    State(state): State<AppState>,
    RequestId(id): RequestId,
) -> AppResult<Response> {
    let request = owned_request(&state, &session, id).await?;
    if request.status != RequestStatus::Issued {
        return Err(AppError::Forbidden);
    }

    let bytes = state
        .storage
        .get_object(
            Bucket::Attachments,
            Bucket::Attachments.key_of(&request.attachment_url),
        )
        .await?;
    Ok(file_response(
        bytes,
        "application/octet-stream",
        format!("attachment-{id}"),
    ))
}

/// download_my_certificate
///
/// [Authenticated Route] Streams the issued certificate PDF of one of the caller's requests.
#[utoipa::path(
    get,
    path = "/api/requests/{id}/certificate",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Certificate bytes (application/pdf)"),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Not found or not issued yet", body = ErrorResponse)
    )
)]
pub async fn download_my_certificate(
    session: Session,
    State(state): State<AppState>,
    RequestId(id): RequestId,
) -> AppResult<Response> {
    let request = owned_request(&state, &session, id).await?;
    let path = request
        .certificate_pdf_url
        .ok_or_else(|| AppError::not_found("Certificate not available"))?;

    let bytes = state
        .storage
        .get_object(Bucket::Certificates, Bucket::Certificates.key_of(&path))
        .await?;
    Ok(file_response(
        bytes,
        "application/pdf",
        format!("certificate-{id}.pdf"),
    ))
}

// --- Request lifecycle (admin) ---

/// admin_list_requests
///
/// [Admin Route] Every request with its owner's email, newest first.
#[utoipa::path(
    get,
    path = "/api/admin/requests",
    responses(
        (status = 200, description = "All requests", body = [AdminRequestSummary]),
        (status = 401, description = "No valid session", body = ErrorResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse)
    )
)]
pub async fn admin_list_requests(
    _admin: AdminSession,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<AdminRequestSummary>>> {
    Ok(Json(state.repo.list_all_requests().await?))
}

/// admin_get_request
///
/// [Admin Route] Full row, attachment path included, plus the owner's email.
#[utoipa::path(
    get,
    path = "/api/admin/requests/{id}",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request", body = AdminRequestDetail),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn admin_get_request(
    _admin: AdminSession,
    State(state): State<AppState>,
    RequestId(id): RequestId,
) -> AppResult<Json<AdminRequestDetail>> {
    state
        .repo
        .get_request_with_owner(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Request not found"))
}

/// admin_update_status
///
/// [Admin Route] Moves a request to any admin-settable status.
///
/// Issuing renders a certificate, stores it under a fresh timestamped key and writes the
/// status and the new path in the same update. Any other status leaves a previously
/// issued certificate path in place. No transition graph is enforced.
#[utoipa::path(
    patch,
    path = "/api/admin/requests/{id}/status",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = StatusChangeRequest,
    responses(
        (status = 200, description = "Status updated", body = StatusChangeResult),
        (status = 400, description = "Status outside the allowed set", body = ErrorResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn admin_update_status(
    admin: AdminSession,
    State(state): State<AppState>,
    RequestId(id): RequestId,
    payload: Result<Json<StatusChangeRequest>, JsonRejection>,
) -> AppResult<Json<StatusChangeResult>> {
    let Json(StatusChangeRequest { status }) = payload?;
    let status = RequestStatus::parse_admin_settable(&status)
        .ok_or_else(|| AppError::validation("Invalid status"))?;

    let request = state
        .repo
        .get_request(id)
        .await?
        .ok_or_else(|| AppError::not_found("Request not found"))?;

    let certificate_path = if status == RequestStatus::Issued {
        let issued_at = Utc::now();
        let pdf = render_certificate(&CertificateContent::for_request(&request, issued_at))?;
        let key = storage::certificate_key(request.id, issued_at);
        state
            .storage
            .put_object(Bucket::Certificates, &key, pdf, "application/pdf")
            .await?;
        Some(Bucket::Certificates.path(&key))
    } else {
        None
    };

    let updated = state
        .repo
        .update_status(id, status, certificate_path.as_deref())
        .await?
        .ok_or_else(|| AppError::not_found("Request not found"))?;

    tracing::info!(
        request_id = %id,
        admin_id = %admin.id,
        from = %request.status,
        to = %updated.status,
        "request status changed"
    );

    Ok(Json(StatusChangeResult::from(updated)))
}

/// admin_download_attachment
///
/// [Admin Route] Streams the original attachment whatever the status, for review.
#[utoipa::path(
    get,
    path = "/api/admin/requests/{id}/download",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Attachment bytes (application/octet-stream)"),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn admin_download_attachment(
    _admin: AdminSession,
    State(state): State<AppState>,
    RequestId(id): RequestId,
) -> AppResult<Response> {
    let request = state
        .repo
        .get_request(id)
        .await?
        .ok_or_else(|| AppError::not_found("Request not found"))?;

    let bytes = state
        .storage
        .get_object(
            Bucket::Attachments,
            Bucket::Attachments.key_of(&request.attachment_url),
        )
        .await?;
    Ok(file_response(
        bytes,
        "application/octet-stream",
        format!("attachment-{id}"),
    ))
}
