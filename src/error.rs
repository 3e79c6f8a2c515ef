//! Error types for the seat-monitor-ble crate.

use thiserror::Error;

use crate::ble::radio::Capability;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    AdapterUnavailable,

    /// A required platform authorization has not been granted.
    #[error("Permission denied: {capability} authorization not granted")]
    PermissionDenied {
        /// The capability that was not authorized.
        capability: Capability,
    },

    /// A scan session is already live.
    #[error("A scan is already in progress")]
    AlreadyScanning,

    /// A connection is already live or in flight.
    #[error("Already connected to {identifier}")]
    AlreadyConnected {
        /// Identifier of the peripheral that owns the live connection.
        identifier: String,
    },

    /// The peripheral handle is not known to the platform backend.
    #[error("Peripheral not found: {identifier}")]
    PeripheralNotFound {
        /// The identifier that was looked up.
        identifier: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Enabling notifications on the seat characteristic failed.
    #[error("Subscription failed: {reason}")]
    SubscriptionFailed {
        /// Description of why the subscription failed.
        reason: String,
    },

    /// A notification payload could not be decoded.
    #[error("Decode error: {context}")]
    DecodeError {
        /// Description of what was invalid about the payload.
        context: String,
    },

    /// The upload transport rejected or failed to deliver a request.
    #[error(
        "Upload failed{}: {message}",
        .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
    )]
    UploadFailed {
        /// HTTP status code, when a response was received.
        status: Option<u16>,
        /// Error body or transport error text.
        message: String,
    },

    /// The configuration is invalid.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },

    /// I/O error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is handled locally and never fails the connection.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::DecodeError { .. } | Self::UploadFailed { .. })
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
