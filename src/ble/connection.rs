//! BLE connection management.
//!
//! Drives the single seat sensor connection through connect, service
//! discovery and notification subscription.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::advertising::PeripheralHandle;
use crate::ble::radio::{Authorization, Capability, GattCharacteristic, GattService, Radio};
use crate::ble::uuids::{
    CLIENT_CHARACTERISTIC_CONFIG_UUID, ENABLE_NOTIFICATION_VALUE, SEAT_SERVICE_UUID,
    SEAT_STATE_CHARACTERISTIC_UUID,
};
use crate::error::{Error, Result};

/// Why a connection attempt ended in [`ConnectionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// The seat service was not offered by the peripheral.
    ServiceNotFound,
    /// The seat state characteristic was missing from the service.
    CharacteristicNotFound,
    /// Notifications could not be enabled.
    SubscriptionFailed,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceNotFound => write!(f, "service not found"),
            Self::CharacteristicNotFound => write!(f, "characteristic not found"),
            Self::SubscriptionFailed => write!(f, "subscription failed"),
        }
    }
}

/// Connection state for the seat sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Connection request submitted.
    Connecting,
    /// Link established.
    Connected,
    /// Service discovery in progress.
    ServicesDiscovering,
    /// Service and characteristic resolved.
    ServicesDiscovered,
    /// Descriptor write in flight.
    NotificationsEnabling,
    /// Notifications are flowing.
    Subscribed,
    /// The attempt failed; a new connect is required.
    Failed(FailureReason),
}

impl ConnectionState {
    /// Check if notifications are flowing.
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            Self::Connecting
                | Self::Connected
                | Self::ServicesDiscovering
                | Self::ServicesDiscovered
                | Self::NotificationsEnabling
        )
    }

    /// Check if the attempt failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::ServicesDiscovering => write!(f, "Discovering services"),
            Self::ServicesDiscovered => write!(f, "Services discovered"),
            Self::NotificationsEnabling => write!(f, "Enabling notifications"),
            Self::Subscribed => write!(f, "Subscribed"),
            Self::Failed(reason) => write!(f, "Failed ({})", reason),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// The identifier of the peripheral.
    pub identifier: String,
    /// The new connection state.
    pub state: ConnectionState,
}

/// Inputs accepted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionSignal {
    /// The link came up.
    Connected,
    /// Service discovery finished.
    ServicesDiscovered(Vec<GattService>),
    /// The configuration descriptor write finished.
    DescriptorWritten {
        /// Whether the write succeeded.
        success: bool,
    },
    /// The peripheral dropped the link.
    Disconnected,
}

/// The single logical connection.
#[derive(Debug, Clone)]
pub struct Connection {
    peripheral: PeripheralHandle,
    state: ConnectionState,
    service_id: Uuid,
    characteristic_id: Uuid,
    notify_config_id: Uuid,
    characteristic: Option<GattCharacteristic>,
}

impl Connection {
    fn new(peripheral: PeripheralHandle) -> Self {
        Self {
            peripheral,
            state: ConnectionState::Disconnected,
            service_id: SEAT_SERVICE_UUID,
            characteristic_id: SEAT_STATE_CHARACTERISTIC_UUID,
            notify_config_id: CLIENT_CHARACTERISTIC_CONFIG_UUID,
            characteristic: None,
        }
    }

    /// The connected peripheral.
    pub fn peripheral(&self) -> &PeripheralHandle {
        &self.peripheral
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Service UUID this connection resolves.
    pub fn service_id(&self) -> Uuid {
        self.service_id
    }

    /// Characteristic UUID this connection subscribes to.
    pub fn characteristic_id(&self) -> Uuid {
        self.characteristic_id
    }

    /// Descriptor UUID written to enable notifications.
    pub fn notify_config_id(&self) -> Uuid {
        self.notify_config_id
    }

    /// The resolved characteristic, present from `ServicesDiscovered` on.
    pub fn characteristic(&self) -> Option<&GattCharacteristic> {
        self.characteristic.as_ref()
    }
}

/// Manages the connection to the seat sensor.
pub struct ConnectionManager {
    radio: Arc<dyn Radio>,
    authorization: Arc<dyn Authorization>,
    connection: Option<Connection>,
    /// Peripherals torn down whose disconnect signal has not arrived yet.
    pending_disconnects: HashSet<String>,
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new(radio: Arc<dyn Radio>, authorization: Arc<dyn Authorization>) -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            radio,
            authorization,
            connection: None,
            pending_disconnects: HashSet::new(),
            event_tx,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map(Connection::state)
            .unwrap_or_default()
    }

    /// The live connection, if any.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Check if `identifier` is the peripheral of the live connection.
    pub fn is_connection_to(&self, identifier: &str) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.peripheral.id() == identifier)
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Submit a connection request.
    ///
    /// A connection left in [`ConnectionState::Failed`] is torn down first,
    /// so a failed attempt can be retried with a fresh call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if connecting is not authorized
    /// and [`Error::AlreadyConnected`] while another attempt is live.
    pub fn connect(&mut self, peripheral: PeripheralHandle) -> Result<()> {
        if !self.authorization.status(Capability::Connect).is_granted() {
            return Err(Error::PermissionDenied {
                capability: Capability::Connect,
            });
        }

        if let Some(existing) = &self.connection {
            if !existing.state.is_failed() {
                return Err(Error::AlreadyConnected {
                    identifier: existing.peripheral.id().to_string(),
                });
            }
            debug!("Replacing failed connection to {}", existing.peripheral);
            self.teardown();
        }

        self.radio.connect(&peripheral)?;

        info!("Connecting to {}", peripheral);
        self.connection = Some(Connection::new(peripheral));
        self.set_state(ConnectionState::Connecting);

        Ok(())
    }

    /// Release the connection and request a disconnect without waiting.
    pub fn teardown(&mut self) {
        let Some(connection) = self.connection.take() else {
            debug!("No connection, ignoring teardown");
            return;
        };

        info!("Disconnecting from {}", connection.peripheral);
        self.radio.disconnect(&connection.peripheral);
        self.pending_disconnects
            .insert(connection.peripheral.id().to_string());
        self.emit(
            &connection.peripheral,
            connection.state,
            ConnectionState::Disconnected,
        );
    }

    /// Process one signal for the peripheral `identifier`.
    ///
    /// Signals for other peripherals, or with no live connection, are
    /// ignored. The first `Disconnected` after a [`teardown`](Self::teardown)
    /// belongs to the released link and is consumed, unless the replacement
    /// attempt has already come up. Returns the resulting state.
    ///
    /// # Errors
    ///
    /// Returns the failure that moved the connection to
    /// [`ConnectionState::Failed`].
    pub fn handle_event(
        &mut self,
        identifier: &str,
        signal: ConnectionSignal,
    ) -> Result<ConnectionState> {
        let state = self.state();
        let pending = self.pending_disconnects.contains(identifier);
        let awaiting_link = matches!(
            state,
            ConnectionState::Disconnected | ConnectionState::Connecting
        );

        match signal {
            ConnectionSignal::Disconnected if pending && awaiting_link => {
                debug!("Released link to {} closed", identifier);
                self.pending_disconnects.remove(identifier);
                return Ok(state);
            }
            ConnectionSignal::Connected if pending => {
                self.pending_disconnects.remove(identifier);
            }
            _ => {}
        }

        if !self.is_connection_to(identifier) {
            debug!("Ignoring {:?} for {} (no live connection)", signal, identifier);
            return Ok(state);
        }

        match (state, signal) {
            (_, ConnectionSignal::Disconnected) => {
                info!("Peripheral {} disconnected", identifier);
                if let Some(connection) = self.connection.take() {
                    self.emit(
                        &connection.peripheral,
                        connection.state,
                        ConnectionState::Disconnected,
                    );
                }
            }
            (ConnectionState::Connecting, ConnectionSignal::Connected) => {
                info!("Connected to {}", identifier);
                self.set_state(ConnectionState::Connected);
                if let Some(connection) = &self.connection {
                    self.radio.discover_services(&connection.peripheral);
                }
                self.set_state(ConnectionState::ServicesDiscovering);
            }
            (
                ConnectionState::ServicesDiscovering,
                ConnectionSignal::ServicesDiscovered(services),
            ) => {
                self.on_services_discovered(&services)?;
            }
            (
                ConnectionState::NotificationsEnabling,
                ConnectionSignal::DescriptorWritten { success },
            ) => {
                if success {
                    info!("Notifications enabled on {}", identifier);
                    self.set_state(ConnectionState::Subscribed);
                } else {
                    return Err(self.fail(
                        FailureReason::SubscriptionFailed,
                        Error::SubscriptionFailed {
                            reason: "descriptor write rejected".to_string(),
                        },
                    ));
                }
            }
            (state, signal) => {
                warn!("Unexpected {:?} in state {}", signal, state);
            }
        }

        Ok(self.state())
    }

    fn on_services_discovered(&mut self, services: &[GattService]) -> Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };

        for service in services {
            debug!("Found service: {}", service.uuid);
        }

        let Some(service) = services.iter().find(|s| s.uuid == connection.service_id) else {
            let uuid = connection.service_id.to_string();
            return Err(self.fail(FailureReason::ServiceNotFound, Error::ServiceNotFound { uuid }));
        };

        let Some(characteristic) = service.characteristic(&connection.characteristic_id) else {
            let uuid = connection.characteristic_id.to_string();
            return Err(self.fail(
                FailureReason::CharacteristicNotFound,
                Error::CharacteristicNotFound { uuid },
            ));
        };

        connection.characteristic = Some(characteristic.clone());
        let has_config = characteristic.descriptors.contains(&connection.notify_config_id);
        self.set_state(ConnectionState::ServicesDiscovered);

        if !has_config {
            return Err(self.fail(
                FailureReason::SubscriptionFailed,
                Error::SubscriptionFailed {
                    reason: "descriptor not found".to_string(),
                },
            ));
        }

        if let Some(connection) = &self.connection {
            debug!("Writing notification config to {}", connection.characteristic_id);
            self.radio.write_descriptor(
                &connection.peripheral,
                connection.characteristic_id,
                connection.notify_config_id,
                &ENABLE_NOTIFICATION_VALUE,
            );
        }
        self.set_state(ConnectionState::NotificationsEnabling);

        Ok(())
    }

    /// Move to `Failed`, keeping the physical link, and hand back the error.
    fn fail(&mut self, reason: FailureReason, error: Error) -> Error {
        warn!("Connection failed: {}", error);
        self.set_state(ConnectionState::Failed(reason));
        error
    }

    /// Update the connection state and emit an event.
    fn set_state(&mut self, new_state: ConnectionState) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        let old_state = connection.state;
        connection.state = new_state;
        let peripheral = connection.peripheral.clone();
        self.emit(&peripheral, old_state, new_state);
    }

    fn emit(
        &self,
        peripheral: &PeripheralHandle,
        old_state: ConnectionState,
        new_state: ConnectionState,
    ) {
        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);

            let _ = self.event_tx.send(ConnectionEvent {
                identifier: peripheral.id().to_string(),
                state: new_state,
            });
        }
    }
}
