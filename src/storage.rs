use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::primitives::ByteStream;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};
use thiserror::Error;
use uuid::Uuid;

/// Bucket
///
/// The two object buckets of the service. Stored paths are prefixed with the bucket's
/// logical name (`attachments/...`, `certificates/...`); the physical bucket name may
/// differ per deployment and is resolved by the concrete client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Attachments,
    Certificates,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Attachments => "attachments",
            Bucket::Certificates => "certificates",
        }
    }

    /// The bucket-prefixed path persisted in the `requests` table.
    pub fn path(&self, key: &str) -> String {
        format!("{}/{}", self.as_str(), key)
    }

    /// Strips this bucket's prefix from a stored path. Paths persisted without the
    /// prefix are already bare keys.
    pub fn key_of<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix(self.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(path)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

// 1. StorageService Contract
/// StorageService
///
/// Contract for the object store holding uploaded attachments and generated
/// certificates. Handlers only see this trait: production uses `S3StorageClient`,
/// tests use `InMemoryStorage`.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the buckets if missing. Only called for `Env::Local` (MinIO).
    async fn ensure_buckets_exist(&self);

    async fn put_object(
        &self,
        bucket: Bucket,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn get_object(&self, bucket: Bucket, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;

// 2. The Real Implementation (S3/MinIO/Supabase)
/// S3StorageClient
///
/// `aws-sdk-s3` client talking to the Supabase Storage S3 gateway in production and to
/// MinIO locally. Both require path-style addressing.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    attachments_bucket: String,
    certificates_bucket: String,
}

impl S3StorageClient {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        attachments_bucket: &str,
        certificates_bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            attachments_bucket: attachments_bucket.to_string(),
            certificates_bucket: certificates_bucket.to_string(),
        }
    }

    fn bucket_name(&self, bucket: Bucket) -> &str {
        match bucket {
            Bucket::Attachments => &self.attachments_bucket,
            Bucket::Certificates => &self.certificates_bucket,
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// CreateBucket is idempotent on MinIO; errors for already-owned buckets are ignored.
    async fn ensure_buckets_exist(&self) {
        for bucket in [Bucket::Attachments, Bucket::Certificates] {
            let name = self.bucket_name(bucket);
            if let Err(e) = self.client.create_bucket().bucket(name).send().await {
                tracing::debug!("create_bucket {} skipped: {}", name, e);
            }
        }
    }

    async fn put_object(
        &self,
        bucket: Bucket,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(self.bucket_name(bucket))
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_object(&self, bucket: Bucket, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(self.bucket_name(bucket))
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(bucket.path(key))
                } else {
                    StorageError::Backend(e.to_string())
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }
}

// --- Object naming ---

/// sanitize_file_name
///
/// Reduces a client-supplied filename to its last path segment, dropping directory
/// navigation (`..`, `.`) and separators of either style.
pub fn sanitize_file_name(name: &str) -> String {
    name.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .last()
        .unwrap_or("attachment")
        .to_string()
}

/// Key for an uploaded attachment: namespaced by owner and disambiguated by the
/// upload instant in milliseconds.
pub fn attachment_key(owner: Uuid, file_name: &str, uploaded_at: DateTime<Utc>) -> String {
    format!(
        "user-{}/{}-{}",
        owner,
        uploaded_at.timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

/// Key for a generated certificate, unique per request and issuance instant.
pub fn certificate_key(request_id: Uuid, issued_at: DateTime<Utc>) -> String {
    format!(
        "certificate-{}-{}.pdf",
        request_id,
        issued_at.timestamp_millis()
    )
}

// 3. The In-Memory Implementation (For Tests)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// InMemoryStorage
///
/// A `StorageService` backed by a map, used by the test suites in place of S3.
#[derive(Default)]
pub struct InMemoryStorage {
    objects: Mutex<HashMap<(Bucket, String), StoredObject>>,
    /// When true, all operations return a simulated backend failure.
    pub should_fail: bool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn object(&self, bucket: Bucket, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(&(bucket, key.to_string())).cloned())
    }

    pub fn keys(&self, bucket: Bucket) -> Vec<String> {
        let Ok(objects) = self.objects.lock() else {
            return vec![];
        };
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(b, _)| *b == bucket)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn simulated_failure(&self) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend(
                "In-memory storage: failure requested".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageService for InMemoryStorage {
    async fn ensure_buckets_exist(&self) {}

    async fn put_object(
        &self,
        bucket: Bucket,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.simulated_failure()?;
        let mut objects = self
            .objects
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        objects.insert(
            (bucket, key.to_string()),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: Bucket, key: &str) -> Result<Vec<u8>, StorageError> {
        self.simulated_failure()?;
        self.object(bucket, key)
            .map(|object| object.bytes)
            .ok_or_else(|| StorageError::NotFound(bucket.path(key)))
    }
}
