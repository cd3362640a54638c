use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// Returned when a stored or submitted label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// --- Enumerations ---

/// Role
///
/// The RBAC label carried both in the `users.role` column and inside the session claim set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RequestStatus
///
/// Lifecycle label of a certificate request. `Received` is only ever set at creation;
/// the remaining four are the values an administrator may assign. No transition graph
/// is enforced: any admin-settable value may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum RequestStatus {
    #[default]
    Received,
    Validating,
    Issued,
    Rejected,
    NeedsCorrection,
}

impl RequestStatus {
    /// The closed set accepted by the admin status-change endpoint.
    pub const ADMIN_SETTABLE: [RequestStatus; 4] = [
        RequestStatus::Validating,
        RequestStatus::Issued,
        RequestStatus::Rejected,
        RequestStatus::NeedsCorrection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Received => "RECEIVED",
            RequestStatus::Validating => "VALIDATING",
            RequestStatus::Issued => "ISSUED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::NeedsCorrection => "NEEDS_CORRECTION",
        }
    }

    /// Parses a value submitted by an administrator. `RECEIVED` is rejected along with
    /// any unknown label.
    pub fn parse_admin_settable(value: &str) -> Option<RequestStatus> {
        Self::ADMIN_SETTABLE
            .into_iter()
            .find(|status| status.as_str() == value)
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIVED" => Ok(RequestStatus::Received),
            "VALIDATING" => Ok(RequestStatus::Validating),
            "ISSUED" => Ok(RequestStatus::Issued),
            "REJECTED" => Ok(RequestStatus::Rejected),
            "NEEDS_CORRECTION" => Ok(RequestStatus::NeedsCorrection),
            other => Err(UnknownVariant {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for RequestStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// An account row from the `users` table. The password hash never leaves the server:
/// it is skipped on serialization and absent from every response schema.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    // Unique, compared case-sensitively as stored.
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

/// CertificateRequest
///
/// A full row from the `requests` table.
///
/// `attachment_url` and `certificate_pdf_url` are bucket-prefixed object paths
/// (`attachments/...`, `certificates/...`), not public URLs.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct CertificateRequest {
    pub id: Uuid,
    // FK to users.id (owner).
    pub user_id: Uuid,
    pub certificate_type: String,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,

    // Subject of the certificate. May differ from the submitting account.
    pub first_name: String,
    pub last_name: String,
    pub personal_id: String,
    pub birth_date: String,

    pub attachment_url: String,
    pub certificate_pdf_url: Option<String>,
}

/// RequestSummary
///
/// Listing projection returned by `GET /api/requests`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct RequestSummary {
    pub id: Uuid,
    pub certificate_type: String,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<&CertificateRequest> for RequestSummary {
    fn from(request: &CertificateRequest) -> Self {
        Self {
            id: request.id,
            certificate_type: request.certificate_type.clone(),
            status: request.status,
            created_at: request.created_at,
        }
    }
}

/// AdminRequestSummary
///
/// Listing projection for the admin queue, joined with the owner's email.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AdminRequestSummary {
    pub id: Uuid,
    pub certificate_type: String,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub owner_email: String,
}

/// AdminRequestDetail
///
/// The full request row plus the owner's email, as shown on the admin review page.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AdminRequestDetail {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub request: CertificateRequest,
    pub owner_email: String,
}

/// NewCertificateRequest
///
/// Insert payload built by the create handler once the attachment is stored.
/// Status is not part of it: every new row starts as `RECEIVED`.
#[derive(Debug, Clone, Default)]
pub struct NewCertificateRequest {
    pub user_id: Uuid,
    pub certificate_type: String,
    pub first_name: String,
    pub last_name: String,
    pub personal_id: String,
    pub birth_date: String,
    pub attachment_url: String,
}

// --- Request Payloads (Input Schemas) ---

/// Credentials
///
/// Body of both `POST /api/auth/register` and `POST /api/auth/login`.
/// Missing fields deserialize as empty strings and are rejected by validation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Credentials {
    #[serde(default)]
    #[schema(example = "a@x.com")]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// CreateRequestForm
///
/// Documents the multipart form of `POST /api/requests`. All six parts are required.
#[derive(Debug, Clone, ToSchema)]
pub struct CreateRequestForm {
    #[schema(example = "BIRTH_CERTIFICATE")]
    pub certificate_type: String,
    #[schema(format = Binary)]
    pub attachment: String,
    pub first_name: String,
    pub last_name: String,
    pub personal_id: String,
    #[schema(example = "1990-04-12")]
    pub birth_date: String,
}

/// StatusChangeRequest
///
/// Body of `PATCH /api/admin/requests/{id}/status`. Kept as a raw string so an unknown
/// label is answered with a 400 from the handler rather than a deserializer rejection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct StatusChangeRequest {
    #[serde(default)]
    #[schema(example = "ISSUED")]
    pub status: String,
}

// --- Response Schemas (Output) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub email: String,
}

/// UserProfile
///
/// Output of login and `GET /api/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatedRequest {
    pub id: Uuid,
    pub status: RequestStatus,
}

/// StatusChangeResult
///
/// Output of the admin status change. `certificate_pdf_url` is present once the request
/// has been issued at least once.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct StatusChangeResult {
    pub id: Uuid,
    pub status: RequestStatus,
    pub certificate_pdf_url: Option<String>,
}

impl From<CertificateRequest> for StatusChangeResult {
    fn from(request: CertificateRequest) -> Self {
        Self {
            id: request.id,
            status: request.status,
            certificate_pdf_url: request.certificate_pdf_url,
        }
    }
}

/// PingResponse
///
/// Store connectivity probe used by deployment checks.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PingResponse {
    pub ok: bool,
    pub users: i64,
}

/// Error body shared by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct ErrorResponse {
    pub error: String,
}
