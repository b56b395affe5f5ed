//! HTTP access to the kiosk proxy backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::AssetId,
    protocol::{
        AlbumsResponse, ConfigResponse, HealthResponse, ImageRecord, MemoriesResponse,
        StatusResponse,
    },
};
use url::Url;

use crate::error::ClientError;

/// Liveness and upstream-status probes get a short budget; list endpoints
/// and image bytes may hit the upstream photo server and get a longer one.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const DATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Seam between the slideshow controller and the proxy backend. The GUI
/// wires in [`HttpBackend`]; tests substitute a scripted double.
#[async_trait]
pub trait KioskBackend: Send + Sync {
    async fn check_health(&self) -> Result<HealthResponse, ClientError>;
    async fn check_status(&self) -> Result<StatusResponse, ClientError>;
    async fn fetch_config(&self) -> Result<ConfigResponse, ClientError>;
    async fn fetch_memories(&self) -> Result<Vec<ImageRecord>, ClientError>;
    async fn fetch_albums(&self) -> Result<AlbumsResponse, ClientError>;
    /// Full-resolution bytes through the proxy endpoint.
    async fn fetch_image(&self, id: &AssetId) -> Result<Vec<u8>, ClientError>;
    /// Fallback bytes from a record's thumbnail URL (absolute or
    /// backend-relative).
    async fn fetch_thumbnail(&self, thumbnail_url: &str) -> Result<Vec<u8>, ClientError>;
}

pub struct HttpBackend {
    http: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Url::parse(base_url).map_err(|err| {
            ClientError::connectivity(format!("invalid backend url '{base_url}': {err}"))
        })?;
        Ok(Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Thumbnail URLs arrive either absolute or relative to the backend.
    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{url}", self.base_url)
        } else {
            format!("{}/{url}", self.base_url)
        }
    }
}

#[async_trait]
impl KioskBackend for HttpBackend {
    async fn check_health(&self) -> Result<HealthResponse, ClientError> {
        self.http
            .get(self.endpoint("/health"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| ClientError::connectivity(err.to_string()))?
            .json()
            .await
            .map_err(|err| ClientError::connectivity(format!("invalid health payload: {err}")))
    }

    async fn check_status(&self) -> Result<StatusResponse, ClientError> {
        self.http
            .get(self.endpoint("/api/immich/status"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| ClientError::connectivity(err.to_string()))?
            .json()
            .await
            .map_err(|err| ClientError::connectivity(format!("invalid status payload: {err}")))
    }

    async fn fetch_config(&self) -> Result<ConfigResponse, ClientError> {
        self.http
            .get(self.endpoint("/api/config"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| ClientError::load(err.to_string()))?
            .json()
            .await
            .map_err(|err| ClientError::load(format!("invalid config payload: {err}")))
    }

    async fn fetch_memories(&self) -> Result<Vec<ImageRecord>, ClientError> {
        let body: MemoriesResponse = self
            .http
            .get(self.endpoint("/api/memories"))
            .timeout(DATA_TIMEOUT)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| ClientError::load(err.to_string()))?
            .json()
            .await
            .map_err(|err| ClientError::load(format!("invalid memories payload: {err}")))?;

        if !body.success {
            return Err(ClientError::load(
                body.error
                    .unwrap_or_else(|| "backend reported memories failure".to_string()),
            ));
        }
        Ok(body.memories)
    }

    async fn fetch_albums(&self) -> Result<AlbumsResponse, ClientError> {
        let body: AlbumsResponse = self
            .http
            .get(self.endpoint("/api/albums"))
            .timeout(DATA_TIMEOUT)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| ClientError::load(err.to_string()))?
            .json()
            .await
            .map_err(|err| ClientError::load(format!("invalid albums payload: {err}")))?;

        if !body.success {
            return Err(ClientError::load(
                body.error
                    .unwrap_or_else(|| "backend reported albums failure".to_string()),
            ));
        }
        Ok(body)
    }

    async fn fetch_image(&self, id: &AssetId) -> Result<Vec<u8>, ClientError> {
        let bytes = self
            .http
            .get(self.endpoint(&format!("/api/proxy/image/{id}")))
            .timeout(DATA_TIMEOUT)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| ClientError::render(id.as_str(), err.to_string()))?
            .bytes()
            .await
            .map_err(|err| ClientError::render(id.as_str(), err.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn fetch_thumbnail(&self, thumbnail_url: &str) -> Result<Vec<u8>, ClientError> {
        let bytes = self
            .http
            .get(self.resolve(thumbnail_url))
            .timeout(DATA_TIMEOUT)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| ClientError::render(thumbnail_url, err.to_string()))?
            .bytes()
            .await
            .map_err(|err| ClientError::render(thumbnail_url, err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
