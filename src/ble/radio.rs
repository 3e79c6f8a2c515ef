//! Platform radio and authorization seams.
//!
//! The [`Radio`] trait is the only way the state machines touch the
//! Bluetooth stack. Every request is non-blocking: it is submitted and its
//! completion is delivered later as a [`RadioEvent`] on the event channel
//! the backend was created with.

use uuid::Uuid;

use crate::ble::advertising::{Discovery, PeripheralHandle};
use crate::error::Result;

/// A GATT characteristic as reported by service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// UUIDs of the descriptors attached to this characteristic.
    pub descriptors: Vec<Uuid>,
}

/// A GATT service as reported by service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics of this service.
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    /// Look up a characteristic by UUID.
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}

/// Signals delivered asynchronously by the radio backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    /// A peripheral was seen while scanning.
    Discovered(Discovery),
    /// A connection request completed successfully.
    Connected {
        /// Identifier of the peripheral.
        peripheral: String,
    },
    /// The link went down, or a connection request failed.
    Disconnected {
        /// Identifier of the peripheral.
        peripheral: String,
    },
    /// Service discovery completed.
    ServicesDiscovered {
        /// Identifier of the peripheral.
        peripheral: String,
        /// Discovered services (empty if discovery failed).
        services: Vec<GattService>,
    },
    /// A descriptor write completed.
    DescriptorWritten {
        /// Identifier of the peripheral.
        peripheral: String,
        /// Whether the write succeeded.
        success: bool,
    },
    /// A characteristic value notification.
    Notification {
        /// Identifier of the peripheral.
        peripheral: String,
        /// UUID of the notifying characteristic.
        characteristic: Uuid,
        /// Raw payload.
        value: Vec<u8>,
    },
}

impl RadioEvent {
    /// Identifier of the peripheral this event concerns.
    pub fn peripheral_id(&self) -> &str {
        match self {
            Self::Discovered(discovery) => discovery.peripheral.id(),
            Self::Connected { peripheral }
            | Self::Disconnected { peripheral }
            | Self::ServicesDiscovered { peripheral, .. }
            | Self::DescriptorWritten { peripheral, .. }
            | Self::Notification { peripheral, .. } => peripheral,
        }
    }
}

/// Non-blocking access to the platform Bluetooth stack.
#[cfg_attr(test, mockall::automock)]
pub trait Radio: Send + Sync {
    /// Whether an adapter is present and powered on.
    fn adapter_available(&self) -> bool;

    /// Begin an unfiltered low-latency scan.
    fn start_scan(&self) -> Result<()>;

    /// Stop the current scan.
    fn stop_scan(&self);

    /// Request a connection to a peripheral.
    fn connect(&self, peripheral: &PeripheralHandle) -> Result<()>;

    /// Request GATT service discovery on a connected peripheral.
    fn discover_services(&self, peripheral: &PeripheralHandle);

    /// Request a descriptor write.
    fn write_descriptor(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    );

    /// Request a disconnect. Completion is not reported.
    fn disconnect(&self, peripheral: &PeripheralHandle);
}

/// Capabilities gated by platform authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Discovering nearby peripherals.
    Scan,
    /// Connecting to a peripheral.
    Connect,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::Connect => write!(f, "connect"),
        }
    }
}

/// Result of an authorization query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    /// The capability may be used.
    Granted,
    /// The capability has been refused.
    Denied,
}

impl AuthorizationStatus {
    /// Check if granted.
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Read-only view of platform authorizations.
///
/// The core only queries; requesting authorization is up to the host.
pub trait Authorization: Send + Sync {
    /// Current status for a capability.
    fn status(&self, capability: Capability) -> AuthorizationStatus;
}

/// Fixed authorization answers.
///
/// Desktop platforms prompt for Bluetooth access on first use, so the
/// default grants everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticAuthorization {
    /// Whether scanning is allowed.
    pub scan: bool,
    /// Whether connecting is allowed.
    pub connect: bool,
}

impl StaticAuthorization {
    /// Grant every capability.
    pub fn granted() -> Self {
        Self {
            scan: true,
            connect: true,
        }
    }

    /// Deny every capability.
    pub fn denied() -> Self {
        Self {
            scan: false,
            connect: false,
        }
    }
}

impl Default for StaticAuthorization {
    fn default() -> Self {
        Self::granted()
    }
}

impl Authorization for StaticAuthorization {
    fn status(&self, capability: Capability) -> AuthorizationStatus {
        let granted = match capability {
            Capability::Scan => self.scan,
            Capability::Connect => self.connect,
        };
        if granted {
            AuthorizationStatus::Granted
        } else {
            AuthorizationStatus::Denied
        }
    }
}
