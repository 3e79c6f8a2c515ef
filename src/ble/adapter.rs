//! btleplug radio backend.
//!
//! Implements [`Radio`] on top of the first system Bluetooth adapter.
//! Each request spawns a task on the runtime the adapter was created on
//! and reports its completion on the event channel.

use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::advertising::{Discovery, PeripheralHandle};
use crate::ble::radio::{GattCharacteristic, GattService, Radio, RadioEvent};
use crate::ble::uuids::{CLIENT_CHARACTERISTIC_CONFIG_UUID, ENABLE_NOTIFICATION_VALUE};
use crate::error::{Error, Result};

struct Shared {
    powered: AtomicBool,
    scanning: AtomicBool,
    peripherals: RwLock<HashMap<String, Peripheral>>,
    event_tx: mpsc::UnboundedSender<RadioEvent>,
}

impl Shared {
    fn send(&self, event: RadioEvent) {
        if self.event_tx.send(event).is_err() {
            trace!("Radio event receiver dropped");
        }
    }

    fn peripheral(&self, id: &str) -> Option<Peripheral> {
        self.peripherals.read().get(id).cloned()
    }
}

/// Radio backed by the platform Bluetooth stack.
pub struct BleAdapter {
    adapter: Adapter,
    shared: Arc<Shared>,
    runtime: Handle,
    event_pump: JoinHandle<()>,
}

impl BleAdapter {
    /// Open the first Bluetooth adapter.
    ///
    /// Must be called from within a tokio runtime. Returns the adapter and
    /// the receiver its [`RadioEvent`]s are delivered on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterUnavailable`] if no adapter is present.
    pub async fn new() -> Result<(Self, mpsc::UnboundedReceiver<RadioEvent>)> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::AdapterUnavailable)?;

        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::AdapterUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        let powered = match adapter.adapter_state().await {
            Ok(state) => state == CentralState::PoweredOn,
            Err(e) => {
                debug!("Adapter state unknown ({}), assuming powered", e);
                true
            }
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            powered: AtomicBool::new(powered),
            scanning: AtomicBool::new(false),
            peripherals: RwLock::new(HashMap::new()),
            event_tx,
        });

        let events = adapter.events().await?;
        let event_pump = tokio::spawn(Self::pump_events(events, adapter.clone(), shared.clone()));

        let radio = Self {
            adapter,
            shared,
            runtime: Handle::current(),
            event_pump,
        };

        Ok((radio, event_rx))
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn pump_events(
        mut events: std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>,
        adapter: Adapter,
        shared: Arc<Shared>,
    ) {
        while let Some(event) = events.next().await {
            match event {
                CentralEvent::DeviceDiscovered(id)
                | CentralEvent::DeviceUpdated(id)
                | CentralEvent::ServicesAdvertisement { id, .. } => {
                    if shared.scanning.load(Ordering::SeqCst) {
                        Self::process_peripheral(&adapter, &shared, id).await;
                    }
                }
                CentralEvent::DeviceConnected(id) => {
                    trace!("Device connected: {:?}", id);
                }
                CentralEvent::DeviceDisconnected(id) => {
                    debug!("Device disconnected: {:?}", id);
                    shared.send(RadioEvent::Disconnected {
                        peripheral: id.to_string(),
                    });
                }
                CentralEvent::StateUpdate(state) => {
                    info!("Adapter state changed: {:?}", state);
                    shared
                        .powered
                        .store(state == CentralState::PoweredOn, Ordering::SeqCst);
                }
                _ => {}
            }
        }

        debug!("Adapter event stream ended");
    }

    async fn process_peripheral(adapter: &Adapter, shared: &Shared, id: PeripheralId) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        let identifier = id.to_string();
        shared
            .peripherals
            .write()
            .insert(identifier.clone(), peripheral);

        shared.send(RadioEvent::Discovered(Discovery {
            peripheral: PeripheralHandle::new(identifier, properties.local_name),
            service_uuids: properties.services,
            rssi: properties.rssi,
        }));
    }

    fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Option<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
    }

    fn services_of(peripheral: &Peripheral) -> Vec<GattService> {
        peripheral
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| GattCharacteristic {
                        uuid: c.uuid,
                        descriptors: c.descriptors.into_iter().map(|d| d.uuid).collect(),
                    })
                    .collect(),
            })
            .collect()
    }
}

impl Radio for BleAdapter {
    fn adapter_available(&self) -> bool {
        self.shared.powered.load(Ordering::SeqCst)
    }

    fn start_scan(&self) -> Result<()> {
        info!("Starting BLE scan");
        self.shared.scanning.store(true, Ordering::SeqCst);

        let adapter = self.adapter.clone();
        self.runtime.spawn(async move {
            if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                error!("Failed to start scan: {}", e);
            }
        });

        Ok(())
    }

    fn stop_scan(&self) {
        if !self.shared.scanning.swap(false, Ordering::SeqCst) {
            debug!("Not scanning, ignoring stop request");
            return;
        }

        info!("Stopping BLE scan");
        let adapter = self.adapter.clone();
        self.runtime.spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        });
    }

    fn connect(&self, peripheral: &PeripheralHandle) -> Result<()> {
        let identifier = peripheral.id().to_string();
        let device = self
            .shared
            .peripheral(&identifier)
            .ok_or_else(|| Error::PeripheralNotFound {
                identifier: identifier.clone(),
            })?;

        let shared = self.shared.clone();
        let runtime = self.runtime.clone();
        self.runtime.spawn(async move {
            if let Err(e) = device.connect().await {
                error!("Connection to {} failed: {}", identifier, e);
                shared.send(RadioEvent::Disconnected {
                    peripheral: identifier,
                });
                return;
            }

            match device.notifications().await {
                Ok(mut notifications) => {
                    let shared = shared.clone();
                    let identifier = identifier.clone();
                    runtime.spawn(async move {
                        while let Some(notification) = notifications.next().await {
                            trace!(
                                "Notification from {}: {:02X?}",
                                notification.uuid,
                                notification.value
                            );
                            shared.send(RadioEvent::Notification {
                                peripheral: identifier.clone(),
                                characteristic: notification.uuid,
                                value: notification.value,
                            });
                        }
                        debug!("Notification stream for {} ended", identifier);
                    });
                }
                Err(e) => error!("Failed to get notifications stream: {}", e),
            }

            shared.send(RadioEvent::Connected {
                peripheral: identifier,
            });
        });

        Ok(())
    }

    fn discover_services(&self, peripheral: &PeripheralHandle) {
        let identifier = peripheral.id().to_string();
        let Some(device) = self.shared.peripheral(&identifier) else {
            warn!("Service discovery for unknown peripheral {}", identifier);
            self.shared.send(RadioEvent::ServicesDiscovered {
                peripheral: identifier,
                services: Vec::new(),
            });
            return;
        };

        let shared = self.shared.clone();
        self.runtime.spawn(async move {
            let services = match device.discover_services().await {
                Ok(()) => Self::services_of(&device),
                Err(e) => {
                    error!("Service discovery on {} failed: {}", identifier, e);
                    Vec::new()
                }
            };

            shared.send(RadioEvent::ServicesDiscovered {
                peripheral: identifier,
                services,
            });
        });
    }

    fn write_descriptor(
        &self,
        peripheral: &PeripheralHandle,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) {
        let identifier = peripheral.id().to_string();
        let device = self.shared.peripheral(&identifier);
        let value = value.to_vec();
        let shared = self.shared.clone();

        self.runtime.spawn(async move {
            let result = match device
                .as_ref()
                .and_then(|d| Self::find_characteristic(d, characteristic).map(|c| (d, c)))
            {
                None => Err(format!("characteristic {} not found", characteristic)),
                Some((device, characteristic))
                    if descriptor == CLIENT_CHARACTERISTIC_CONFIG_UUID
                        && value == ENABLE_NOTIFICATION_VALUE =>
                {
                    // The platform stack owns the client configuration descriptor.
                    device
                        .subscribe(&characteristic)
                        .await
                        .map_err(|e| e.to_string())
                }
                Some((device, characteristic)) => {
                    match characteristic.descriptors.iter().find(|d| d.uuid == descriptor) {
                        Some(target) => device
                            .write_descriptor(target, &value)
                            .await
                            .map_err(|e| e.to_string()),
                        None => Err(format!("descriptor {} not found", descriptor)),
                    }
                }
            };

            let success = match result {
                Ok(()) => true,
                Err(e) => {
                    error!("Descriptor write on {} failed: {}", identifier, e);
                    false
                }
            };

            shared.send(RadioEvent::DescriptorWritten {
                peripheral: identifier,
                success,
            });
        });
    }

    fn disconnect(&self, peripheral: &PeripheralHandle) {
        let Some(device) = self.shared.peripheral(peripheral.id()) else {
            debug!("Disconnect for unknown peripheral {}", peripheral);
            return;
        };

        let identifier = peripheral.id().to_string();
        self.runtime.spawn(async move {
            if let Err(e) = device.disconnect().await {
                warn!("Disconnect from {} failed: {}", identifier, e);
            }
        });
    }
}

impl Drop for BleAdapter {
    fn drop(&mut self) {
        self.shared.scanning.store(false, Ordering::SeqCst);
        self.event_pump.abort();
    }
}
