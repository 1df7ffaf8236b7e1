//! Object store backed by plain HTTP PUT/DELETE against an S3-compatible endpoint

use crate::{ObjectStore, ObjectUpload, Result, StorageError, StoredObject};
use async_trait::async_trait;
use reqwest::{header, Client};
use std::time::Duration;
use tracing::instrument;

/// Configuration for the HTTP object store
#[derive(Clone, Debug)]
pub struct HttpStoreConfig {
    /// Endpoint URL (e.g., "https://s3.amazonaws.com")
    pub endpoint: String,
    /// Bucket objects are written to
    pub bucket: String,
    /// Base URL used when building locators, if it differs from the endpoint
    pub public_base_url: Option<String>,
    /// Optional bearer token sent with every request
    pub access_token: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://s3.amazonaws.com".to_string(),
            bucket: "fumode".to_string(),
            public_base_url: None,
            access_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl HttpStoreConfig {
    /// Create with a custom endpoint and bucket
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    /// Set the bearer token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the base URL used in locators
    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket,
            urlencoding::encode(key)
        )
    }

    fn locator(&self, key: &str) -> String {
        let base = self
            .public_base_url
            .as_deref()
            .unwrap_or(&self.endpoint)
            .trim_end_matches('/');
        format!("{}/{}/{}", base, self.bucket, key)
    }
}

/// HTTP object store client
#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client,
    config: HttpStoreConfig,
}

impl HttpObjectStore {
    /// Create a new HTTP object store
    pub fn new(config: HttpStoreConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::Configuration("bucket name must not be empty".into()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Get the store configuration
    pub fn config(&self) -> &HttpStoreConfig {
        &self.config
    }

    fn map_send_error(&self, err: reqwest::Error) -> StorageError {
        if err.is_timeout() {
            StorageError::Timeout {
                seconds: self.config.timeout.as_secs(),
            }
        } else {
            err.into()
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(skip(self, upload), fields(key = %upload.key, size = upload.data.len()))]
    async fn put_object(&self, upload: ObjectUpload) -> Result<StoredObject> {
        if upload.data.is_empty() {
            return Err(StorageError::EmptyObject(upload.key));
        }

        let size = upload.size();
        let content_type = upload
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let request = self
            .client
            .put(self.config.object_url(&upload.key))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-amz-acl", "public-read")
            .body(upload.data);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(StorageError::Rejected {
                key: upload.key,
                status: response.status().as_u16(),
            });
        }

        Ok(StoredObject {
            locator: self.config.locator(&upload.key),
            key: upload.key,
            size,
            stored_at: chrono::Utc::now(),
        })
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, key: &str) -> Result<()> {
        let request = self.client.delete(self.config.object_url(key));
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(StorageError::Rejected {
                key: key.to_string(),
                status: status.as_u16(),
            })
        }
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> HttpObjectStore {
        HttpObjectStore::new(
            HttpStoreConfig::new(server.uri(), "images")
                .with_public_base_url("https://cdn.example.com"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_object() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/images/1700000000-abc.png"))
            .and(header("content-type", "image/png"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let stored = store_for(&server)
            .put_object(ObjectUpload::new(
                "1700000000-abc.png",
                Some("image/png".into()),
                Bytes::from_static(b"png-bytes"),
            ))
            .await
            .unwrap();

        assert_eq!(stored.locator, "https://cdn.example.com/images/1700000000-abc.png");
        assert_eq!(stored.size, 9);
    }

    #[tokio::test]
    async fn test_put_object_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .put_object(ObjectUpload::new("a.png", None, Bytes::from_static(b"x")))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Rejected { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_put_object_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let mut config = HttpStoreConfig::new(server.uri(), "images");
        config.timeout = Duration::from_millis(100);
        let store = HttpObjectStore::new(config).unwrap();

        let err = store
            .put_object(ObjectUpload::new("slow.png", None, Bytes::from_static(b"x")))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_object_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/images/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        store_for(&server).delete_object("gone.png").await.unwrap();
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let result = HttpObjectStore::new(HttpStoreConfig::new("http://localhost", ""));
        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }
}
