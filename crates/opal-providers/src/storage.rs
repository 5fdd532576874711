use std::time::Duration;

use opal_core::error::AppError;
use opal_core::stage::{ObjectMeta, ObjectStore};
use reqwest::Client;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CHECKSUM_HEADER: &str = "x-amz-meta-sha256";

/// Object storage client speaking plain HTTP GET/HEAD against a
/// path-style endpoint (`{endpoint}/{bucket}/{key}`), as served by MinIO
/// and compatible stores.
#[derive(Clone, Debug)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
    access_token: Option<String>,
    timeout_secs: u64,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, bucket: &str) -> Result<Self, AppError> {
        Self::with_timeout(endpoint, bucket, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: &str,
        bucket: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let parsed = Url::parse(endpoint)
            .map_err(|e| AppError::ConfigError(format!("Invalid storage endpoint: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::ConfigError(format!(
                    "Storage endpoint scheme '{scheme}' is not allowed (only http/https)"
                )));
            }
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::StorageError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            access_token: None,
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::StorageError(e.to_string())
        }
    }
}

impl ObjectStore for HttpObjectStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let url = self.object_url(key);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::StorageError(format!(
                "HTTP {} fetching {key}",
                status.as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to read object body: {e}")))?;
        tracing::debug!(key, bytes = bytes.len(), "Fetched object");
        Ok(bytes.to_vec())
    }

    async fn stat(&self, key: &str) -> Result<ObjectMeta, AppError> {
        let url = self.object_url(key);
        let response = self
            .authorize(self.client.head(&url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::StorageError(format!(
                "HTTP {} statting {key}",
                status.as_u16()
            )));
        }

        let size = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let checksum = response
            .headers()
            .get(CHECKSUM_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ObjectMeta { size, checksum })
    }
}
