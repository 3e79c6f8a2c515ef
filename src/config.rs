//! Runtime configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no
//! file) yields the stock SeatMonitor setup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::ble::uuids::{DEFAULT_SCAN_WINDOW, SEAT_MONITOR_NAME};
use crate::error::{Error, Result};
use crate::upload::http::{normalize_base_url, DEFAULT_BACKEND_URL, DEFAULT_REQUEST_TIMEOUT};

/// Default cap on concurrent uploads.
pub const DEFAULT_MAX_IN_FLIGHT_UPLOADS: usize = 4;

/// Seat monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Collector base URL.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Advertised name of the sensor.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Discovery window in milliseconds.
    #[serde(default = "default_scan_window_ms")]
    pub scan_window_ms: u64,

    /// Maximum concurrent upload requests.
    #[serde(default = "default_max_in_flight_uploads")]
    pub max_in_flight_uploads: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_device_name() -> String {
    SEAT_MONITOR_NAME.to_string()
}

fn default_scan_window_ms() -> u64 {
    DEFAULT_SCAN_WINDOW.as_millis() as u64
}

fn default_max_in_flight_uploads() -> usize {
    DEFAULT_MAX_IN_FLIGHT_UPLOADS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            device_name: default_device_name(),
            scan_window_ms: default_scan_window_ms(),
            max_in_flight_uploads: default_max_in_flight_uploads(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl MonitorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        normalize_base_url(&self.backend_url)?;

        if self.device_name.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "device_name must not be empty".to_string(),
            });
        }

        if self.scan_window_ms == 0 {
            return Err(Error::InvalidConfig {
                reason: "scan_window_ms must be greater than zero".to_string(),
            });
        }

        if self.max_in_flight_uploads == 0 {
            return Err(Error::InvalidConfig {
                reason: "max_in_flight_uploads must be greater than zero".to_string(),
            });
        }

        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig {
                reason: "request_timeout_secs must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// The discovery window as a duration.
    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    /// The request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.device_name, "SeatMonitor");
        assert_eq!(config.scan_window(), Duration::from_millis(30_000));
        assert_eq!(config.backend_url, "https://seat-monitor-backend.onrender.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = MonitorConfig::from_toml_str("").unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = MonitorConfig::from_toml_str(
            r#"
            backend_url = "http://localhost:3000"
            scan_window_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.backend_url, "http://localhost:3000");
        assert_eq!(config.scan_window(), Duration::from_secs(5));
        assert_eq!(config.max_in_flight_uploads, DEFAULT_MAX_IN_FLIGHT_UPLOADS);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            MonitorConfig::from_toml_str("scan_window_ms = 0"),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(
            MonitorConfig::from_toml_str("max_in_flight_uploads = 0"),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(
            MonitorConfig::from_toml_str(r#"backend_url = "localhost""#),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(
            MonitorConfig::from_toml_str(r#"device_name = """#),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(
            MonitorConfig::from_toml_str("scan_window_ms = \"soon\""),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            MonitorConfig::load("/nonexistent/seat-monitor.toml"),
            Err(Error::Io(_))
        ));
    }
}
