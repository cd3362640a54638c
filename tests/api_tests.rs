use docutrack::{
    AppConfig, AppState, InMemoryRepository, InMemoryStorage, create_router,
    handlers::MAX_ATTACHMENT_BYTES,
    models::{RequestStatus, Role},
    password,
    repository::Repository,
    storage::Bucket,
};
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub repo: Arc<InMemoryRepository>,
    pub storage: Arc<InMemoryStorage>,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// A browser-like client: keeps the session cookie between calls.
    fn client(&self) -> Client {
        Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    async fn seed_admin(&self, email: &str, pass: &str) {
        let hash = password::hash_password(pass).unwrap();
        self.repo.create_user(email, &hash, Role::Admin).await.unwrap();
    }

    async fn register(&self, client: &Client, email: &str, pass: &str) -> reqwest::Response {
        client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "email": email, "password": pass }))
            .send()
            .await
            .expect("req fail")
    }

    async fn login(&self, client: &Client, email: &str, pass: &str) -> reqwest::Response {
        client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": pass }))
            .send()
            .await
            .expect("req fail")
    }

    async fn submit(&self, client: &Client) -> reqwest::Response {
        client
            .post(self.url("/api/requests"))
            .multipart(full_form())
            .send()
            .await
            .expect("req fail")
    }
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let storage = Arc::new(InMemoryStorage::new());
    let state = AppState::new(repo.clone(), storage.clone(), AppConfig::default());
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        repo,
        storage,
    }
}

fn full_form() -> Form {
    form_with_attachment(b"%PDF-1.4 scanned".to_vec())
}

fn form_with_attachment(bytes: Vec<u8>) -> Form {
    let attachment = Part::bytes(bytes)
        .file_name("scan.pdf")
        .mime_str("application/pdf")
        .unwrap();
    Form::new()
        .text("certificate_type", "BIRTH_CERTIFICATE")
        .text("first_name", "Ana")
        .text("last_name", "Pérez")
        .text("personal_id", "12345678")
        .text("birth_date", "1990-04-12")
        .part("attachment", attachment)
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app.client().get(app.url("/health")).send().await.expect("req fail");
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_ping_and_openapi_document() {
    let app = spawn_app().await;
    let client = app.client();

    let ping: Value = client
        .get(app.url("/api/ping"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ping, json!({ "ok": true, "users": 0 }));

    let doc: Value = client
        .get(app.url("/api-docs/openapi.json"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(doc["paths"]["/api/admin/requests/{id}/status"]["patch"].is_object());
}

#[tokio::test]
async fn test_register_then_login() {
    let app = spawn_app().await;
    let client = app.client();

    let response = app.register(&client, "a@x.com", "secret1").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let registered: Value = response.json().await.unwrap();

    let response = app.login(&client, "a@x.com", "wrong-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid credentials");

    let response = app.login(&client, "a@x.com", "secret1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile: Value = response.json().await.unwrap();
    assert_eq!(profile["role"], "USER");
    assert_eq!(profile["id"], registered["id"]);

    let me: Value = client
        .get(app.url("/api/auth/me"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["email"], "a@x.com");
}

#[tokio::test]
async fn test_duplicate_registration_is_conflict() {
    let app = spawn_app().await;

    let first = app.register(&app.client(), "a@x.com", "secret1").await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app.register(&app.client(), "a@x.com", "secret2").await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(app.repo.count_users().await.unwrap(), 1);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = spawn_app().await;
    let client = app.client();
    app.register(&client, "a@x.com", "secret1").await;

    let me = client.get(app.url("/api/auth/me")).send().await.unwrap();
    assert_eq!(me.status(), StatusCode::OK);

    let out = client.post(app.url("/api/auth/logout")).send().await.unwrap();
    assert_eq!(out.status(), StatusCode::OK);

    let me = client.get(app.url("/api/auth/me")).send().await.unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_submit_and_list_own_requests() {
    let app = spawn_app().await;
    let client = app.client();
    app.register(&client, "a@x.com", "secret1").await;

    let response = app.submit(&client).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["status"], "RECEIVED");

    let list: Value = client
        .get(app.url("/api/requests"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], created["id"]);

    // The attachment landed under the owner's namespace.
    let keys = app.storage.keys(Bucket::Attachments);
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("user-"));
    assert!(keys[0].ends_with("-scan.pdf"));
}

#[tokio::test]
async fn test_submit_with_missing_fields_is_rejected() {
    let app = spawn_app().await;
    let client = app.client();
    app.register(&client, "a@x.com", "secret1").await;

    let form = Form::new()
        .text("certificate_type", "BIRTH_CERTIFICATE")
        .text("first_name", "Ana");
    let response = client
        .post(app.url("/api/requests"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("last_name"));
    assert!(message.contains("attachment"));
    assert!(app.storage.keys(Bucket::Attachments).is_empty());
}

#[tokio::test]
async fn test_submit_without_session_is_unauthorized() {
    let app = spawn_app().await;
    let response = app.submit(&app.client()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.storage.keys(Bucket::Attachments).is_empty());
}

#[tokio::test]
async fn test_full_issue_flow() {
    let app = spawn_app().await;
    app.seed_admin("root@x.com", "rootpass").await;

    let owner = app.client();
    let stranger = app.client();
    let admin = app.client();
    app.register(&owner, "a@x.com", "secret1").await;
    app.register(&stranger, "b@x.com", "secret1").await;
    app.login(&admin, "root@x.com", "rootpass").await;

    let created: Value = app.submit(&owner).await.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    // Another user cannot read or download it; the admin can.
    let response = stranger.get(app.url(&format!("/api/requests/{id}"))).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = stranger
        .get(app.url(&format!("/api/requests/{id}/download")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let detail: Value = admin
        .get(app.url(&format!("/api/admin/requests/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["owner_email"], "a@x.com");
    let response = admin
        .get(app.url(&format!("/api/admin/requests/{id}/download")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Not issued yet: the owner's download is refused.
    let response = owner
        .get(app.url(&format!("/api/requests/{id}/download")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Unknown status: 400, row unchanged.
    let response = admin
        .patch(app.url(&format!("/api/admin/requests/{id}/status")))
        .json(&json!({ "status": "DONE" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let row: Value = owner
        .get(app.url(&format!("/api/requests/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(row["status"], "RECEIVED");

    // Issue.
    let issued: Value = admin
        .patch(app.url(&format!("/api/admin/requests/{id}/status")))
        .json(&json!({ "status": "ISSUED" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(issued["status"], RequestStatus::Issued.as_str());
    assert!(issued["certificate_pdf_url"].is_string());

    let response = owner
        .get(app.url(&format!("/api/requests/{id}/certificate")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/pdf");
    let pdf = response.bytes().await.unwrap();
    assert!(pdf.starts_with(b"%PDF-"));

    let response = owner
        .get(app.url(&format!("/api/requests/{id}/download")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&response.bytes().await.unwrap()[..], b"%PDF-1.4 scanned");
}

#[tokio::test]
async fn test_admin_api_rejects_plain_users() {
    let app = spawn_app().await;
    let user = app.client();
    app.register(&user, "a@x.com", "secret1").await;

    let anonymous = app
        .client()
        .get(app.url("/api/admin/requests"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let response = user.get(app.url("/api/admin/requests")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = user
        .patch(app.url("/api/admin/requests/00000000-0000-0000-0000-000000000000/status"))
        .json(&json!({ "status": "ISSUED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_malformed_request_id_is_not_found() {
    let app = spawn_app().await;
    let client = app.client();
    app.register(&client, "a@x.com", "secret1").await;

    let response = client.get(app.url("/api/requests/not-a-uuid")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Request not found");
}

#[tokio::test]
async fn test_page_gate_redirects_anonymous_navigation() {
    let app = spawn_app().await;

    let response = app.client().get(app.url("/admin")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()["location"], "/login");
}

#[tokio::test]
async fn test_attachment_size_cap() {
    let app = spawn_app().await;
    let client = app.client();
    app.register(&client, "a@x.com", "secret1").await;

    let post = |size: usize| {
        client
            .post(app.url("/api/requests"))
            .multipart(form_with_attachment(vec![b'x'; size]))
            .send()
    };

    // Exactly 5 MiB is accepted.
    let response = post(MAX_ATTACHMENT_BYTES).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(app.storage.keys(Bucket::Attachments).len(), 1);

    // One byte over is refused by the handler.
    let response = post(MAX_ATTACHMENT_BYTES + 1).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Attachment exceeds 5 MB");

    // Well past the route body limit.
    let response = post(6 * 1024 * 1024).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    assert_eq!(app.storage.keys(Bucket::Attachments).len(), 1);
    assert_eq!(app.repo.list_all_requests().await.unwrap().len(), 1);
}
