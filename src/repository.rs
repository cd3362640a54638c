use crate::models::{
    AdminRequestDetail, AdminRequestSummary, CertificateRequest, NewCertificateRequest,
    RequestStatus, RequestSummary, Role, User,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A unique constraint rejected the write (duplicate email).
    #[error("unique constraint violated")]
    Conflict,
    /// A foreign key or check constraint rejected the write.
    #[error("integrity constraint violated: {0}")]
    Integrity(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return RepositoryError::Conflict;
            }
            if db.is_foreign_key_violation() || db.is_check_violation() {
                return RepositoryError::Integrity(db.message().to_string());
            }
        }
        RepositoryError::Database(err)
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// Contract for the credential store (`users` and `requests` tables). Handlers receive
/// it as an injected `Arc<dyn Repository>`, so the hosted Postgres can be swapped for
/// `InMemoryRepository` in tests.
///
/// Every failure is returned, never swallowed: handlers translate it into a response.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Health ---
    async fn count_users(&self) -> RepoResult<i64>;

    // --- Users ---
    /// Exact, case-sensitive match on the stored email.
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    /// Fails with `RepositoryError::Conflict` if the email is taken.
    async fn create_user(&self, email: &str, password_hash: &str, role: Role) -> RepoResult<User>;

    // --- Requests (owner) ---
    /// Inserts with status `RECEIVED` and a server timestamp.
    async fn create_request(&self, request: NewCertificateRequest)
    -> RepoResult<CertificateRequest>;
    /// Newest first.
    async fn list_requests_for_owner(&self, owner: Uuid) -> RepoResult<Vec<RequestSummary>>;
    async fn get_request(&self, id: Uuid) -> RepoResult<Option<CertificateRequest>>;

    // --- Requests (admin) ---
    /// All requests joined with the owner's email, newest first.
    async fn list_all_requests(&self) -> RepoResult<Vec<AdminRequestSummary>>;
    async fn get_request_with_owner(&self, id: Uuid) -> RepoResult<Option<AdminRequestDetail>>;
    /// Sets the status and, when `certificate_pdf_url` is `Some`, the certificate path,
    /// in one write. `None` leaves a previously stored certificate path untouched.
    /// Returns `Ok(None)` for an unknown id.
    async fn update_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        certificate_pdf_url: Option<&str>,
    ) -> RepoResult<Option<CertificateRequest>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const REQUEST_COLUMNS: &str = "id, user_id, certificate_type, status, created_at, \
     first_name, last_name, personal_id, birth_date, attachment_url, certificate_pdf_url";

/// PostgresRepository
///
/// `Repository` backed by the hosted Postgres through a `PgPool` using the service-level
/// connection string.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn count_users(&self) -> RepoResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, role FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, role FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, email: &str, password_hash: &str, role: Role) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, password_hash, role
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_request(
        &self,
        request: NewCertificateRequest,
    ) -> RepoResult<CertificateRequest> {
        let query = format!(
            r#"
            INSERT INTO requests (
                id, user_id, certificate_type, status, created_at,
                first_name, last_name, personal_id, birth_date, attachment_url
            )
            VALUES ($1, $2, $3, $4, NOW(), $5, $6, $7, $8, $9)
            RETURNING {REQUEST_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, CertificateRequest>(&query)
            .bind(Uuid::new_v4())
            .bind(request.user_id)
            .bind(request.certificate_type)
            .bind(RequestStatus::Received.as_str())
            .bind(request.first_name)
            .bind(request.last_name)
            .bind(request.personal_id)
            .bind(request.birth_date)
            .bind(request.attachment_url)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn list_requests_for_owner(&self, owner: Uuid) -> RepoResult<Vec<RequestSummary>> {
        let rows = sqlx::query_as::<_, RequestSummary>(
            r#"
            SELECT id, certificate_type, status, created_at
            FROM requests
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_request(&self, id: Uuid) -> RepoResult<Option<CertificateRequest>> {
        let query = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1");
        let row = sqlx::query_as::<_, CertificateRequest>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// list_all_requests
    ///
    /// Admin queue. The JOIN on `users` supplies `owner_email`; the FK guarantees every
    /// request has exactly one match.
    async fn list_all_requests(&self) -> RepoResult<Vec<AdminRequestSummary>> {
        let rows = sqlx::query_as::<_, AdminRequestSummary>(
            r#"
            SELECT r.id, r.certificate_type, r.status, r.created_at, u.email AS owner_email
            FROM requests r
            JOIN users u ON u.id = r.user_id
            ORDER BY r.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_request_with_owner(&self, id: Uuid) -> RepoResult<Option<AdminRequestDetail>> {
        let row = sqlx::query_as::<_, AdminRequestDetail>(
            r#"
            SELECT r.id, r.user_id, r.certificate_type, r.status, r.created_at,
                   r.first_name, r.last_name, r.personal_id, r.birth_date,
                   r.attachment_url, r.certificate_pdf_url, u.email AS owner_email
            FROM requests r
            JOIN users u ON u.id = r.user_id
            WHERE r.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// update_status
    ///
    /// One UPDATE: `COALESCE` keeps the stored certificate path when no new one is given.
    /// Last write wins; there is no optimistic-concurrency check.
    async fn update_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        certificate_pdf_url: Option<&str>,
    ) -> RepoResult<Option<CertificateRequest>> {
        let query = format!(
            r#"
            UPDATE requests
            SET status = $2,
                certificate_pdf_url = COALESCE($3, certificate_pdf_url)
            WHERE id = $1
            RETURNING {REQUEST_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, CertificateRequest>(&query)
            .bind(id)
            .bind(status.as_str())
            .bind(certificate_pdf_url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

// --- In-memory implementation ---

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    requests: Vec<CertificateRequest>,
}

/// InMemoryRepository
///
/// A `Repository` over two vectors behind a mutex. Mirrors the Postgres constraints the
/// handlers depend on: unique email and an existing owner for every request.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    /// When true, every call fails as if the database were unreachable.
    pub should_fail: bool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> RepoResult<T>) -> RepoResult<T> {
        if self.should_fail {
            return Err(RepositoryError::Unavailable(
                "In-memory repository: failure requested".to_string(),
            ));
        }
        let mut tables = self
            .tables
            .lock()
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
        f(&mut tables)
    }

    // Ties on `created_at` fall back to reverse insertion order.
    fn newest_first(requests: &mut [CertificateRequest]) {
        requests.reverse();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn count_users(&self) -> RepoResult<i64> {
        self.with_tables(|t| Ok(t.users.len() as i64))
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.with_tables(|t| Ok(t.users.iter().find(|u| u.email == email).cloned()))
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        self.with_tables(|t| Ok(t.users.iter().find(|u| u.id == id).cloned()))
    }

    async fn create_user(&self, email: &str, password_hash: &str, role: Role) -> RepoResult<User> {
        self.with_tables(|t| {
            if t.users.iter().any(|u| u.email == email) {
                return Err(RepositoryError::Conflict);
            }
            let user = User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                role,
            };
            t.users.push(user.clone());
            Ok(user)
        })
    }

    async fn create_request(
        &self,
        request: NewCertificateRequest,
    ) -> RepoResult<CertificateRequest> {
        self.with_tables(|t| {
            if !t.users.iter().any(|u| u.id == request.user_id) {
                return Err(RepositoryError::Integrity(format!(
                    "owner {} does not exist",
                    request.user_id
                )));
            }
            let row = CertificateRequest {
                id: Uuid::new_v4(),
                user_id: request.user_id,
                certificate_type: request.certificate_type,
                status: RequestStatus::Received,
                created_at: Utc::now(),
                first_name: request.first_name,
                last_name: request.last_name,
                personal_id: request.personal_id,
                birth_date: request.birth_date,
                attachment_url: request.attachment_url,
                certificate_pdf_url: None,
            };
            t.requests.push(row.clone());
            Ok(row)
        })
    }

    async fn list_requests_for_owner(&self, owner: Uuid) -> RepoResult<Vec<RequestSummary>> {
        self.with_tables(|t| {
            let mut own: Vec<CertificateRequest> = t
                .requests
                .iter()
                .filter(|r| r.user_id == owner)
                .cloned()
                .collect();
            Self::newest_first(&mut own);
            Ok(own.iter().map(RequestSummary::from).collect())
        })
    }

    async fn get_request(&self, id: Uuid) -> RepoResult<Option<CertificateRequest>> {
        self.with_tables(|t| Ok(t.requests.iter().find(|r| r.id == id).cloned()))
    }

    async fn list_all_requests(&self) -> RepoResult<Vec<AdminRequestSummary>> {
        self.with_tables(|t| {
            let mut all = t.requests.clone();
            Self::newest_first(&mut all);
            Ok(all
                .iter()
                .filter_map(|r| {
                    let owner = t.users.iter().find(|u| u.id == r.user_id)?;
                    Some(AdminRequestSummary {
                        id: r.id,
                        certificate_type: r.certificate_type.clone(),
                        status: r.status,
                        created_at: r.created_at,
                        owner_email: owner.email.clone(),
                    })
                })
                .collect())
        })
    }

    async fn get_request_with_owner(&self, id: Uuid) -> RepoResult<Option<AdminRequestDetail>> {
        self.with_tables(|t| {
            Ok(t.requests.iter().find(|r| r.id == id).and_then(|r| {
                let owner = t.users.iter().find(|u| u.id == r.user_id)?;
                Some(AdminRequestDetail {
                    request: r.clone(),
                    owner_email: owner.email.clone(),
                })
            }))
        })
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        certificate_pdf_url: Option<&str>,
    ) -> RepoResult<Option<CertificateRequest>> {
        self.with_tables(|t| {
            let Some(row) = t.requests.iter_mut().find(|r| r.id == id) else {
                return Ok(None);
            };
            row.status = status;
            if let Some(path) = certificate_pdf_url {
                row.certificate_pdf_url = Some(path.to_string());
            }
            Ok(Some(row.clone()))
        })
    }
}
