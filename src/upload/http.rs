//! HTTP client for the seat monitor collector backend.
//!
//! # Example
//!
//! ```no_run
//! use seat_monitor_ble::data::{SeatState, SeatStateRecord};
//! use seat_monitor_ble::upload::{HttpUploader, SeatStateUploader};
//!
//! # async fn example() -> seat_monitor_ble::Result<()> {
//! let client = HttpUploader::new("https://seat-monitor-backend.onrender.com")?;
//! let response = client
//!     .send_seat_state(&SeatStateRecord::from(SeatState::Normal))
//!     .await?;
//! println!("{}", response.message);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::data::{ApiResponse, SeatStateRecord};
use crate::error::{Error, Result};
use crate::upload::SeatStateUploader;

/// Default collector base URL.
pub const DEFAULT_BACKEND_URL: &str = "https://seat-monitor-backend.onrender.com";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Collector client over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    base_url: String,
}

impl HttpUploader {
    /// Create a client with the default timeout.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The collector base URL (e.g., "http://localhost:3000")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig {
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Self::with_client(base_url, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        Ok(Self { client, base_url })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response.json::<T>().await.map_err(|e| Error::UploadFailed {
                status: Some(status.as_u16()),
                message: format!("invalid response body: {}", e),
            })
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            Err(Error::UploadFailed {
                status: Some(status.as_u16()),
                message,
            })
        }
    }
}

#[async_trait]
impl SeatStateUploader for HttpUploader {
    async fn send_seat_state(&self, record: &SeatStateRecord) -> Result<ApiResponse> {
        let url = self.url("api/seat-state");
        debug!("POST {} {:?}", url, record);

        let response = self
            .client
            .post(&url)
            .json(record)
            .send()
            .await
            .map_err(transport_error)?;

        Self::handle_response(response).await
    }

    async fn seat_states(&self) -> Result<Vec<SeatStateRecord>> {
        let url = self.url("api/seat-states");
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;

        Self::handle_response(response).await
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::UploadFailed {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

/// Trim trailing slashes and require an http(s) scheme.
pub(crate) fn normalize_base_url(base_url: &str) -> Result<String> {
    let base_url = base_url.trim().trim_end_matches('/');

    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(Error::InvalidConfig {
            reason: format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            ),
        });
    }

    Ok(base_url.to_string())
}
