//! Seat monitor runtime.
//!
//! Wires the scan controller, connection manager and notification relay
//! to the radio event stream. All inputs (user commands, radio events and
//! scan timers) are handled one at a time on a single task; only uploads
//! run concurrently.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::ble::advertising::{AdvertisementFilter, PeripheralHandle};
use crate::ble::connection::{ConnectionManager, ConnectionSignal, ConnectionState};
use crate::ble::radio::{Authorization, Radio, RadioEvent};
use crate::ble::scanner::{ScanController, ScanEvent, ScanStatus};
use crate::ble::uuids::SEAT_SERVICE_UUID;
use crate::config::MonitorConfig;
use crate::relay::NotificationRelay;
use crate::status::StatusBoard;
use crate::upload::{SeatStateUploader, UploadDispatcher, UploadOutcome};

/// Commands accepted from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    /// Open a discovery window.
    StartScan,
    /// Close the discovery window early.
    StopScan,
    /// Drop the sensor connection.
    Disconnect,
    /// Stop everything and end [`SeatMonitor::run`].
    Shutdown,
}

/// Read-only snapshot of the two state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorState {
    /// Scan session status.
    pub scan: ScanStatus,
    /// Connection state.
    pub connection: ConnectionState,
}

/// Handle used by the presentation layer to drive the monitor.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<MonitorCommand>,
    status: StatusBoard,
    state: watch::Receiver<MonitorState>,
    uploads: UploadDispatcher,
}

impl MonitorHandle {
    /// Start scanning now.
    pub fn start_scan(&self) {
        self.send(MonitorCommand::StartScan);
    }

    /// Stop the current scan.
    pub fn stop_scan(&self) {
        self.send(MonitorCommand::StopScan);
    }

    /// Disconnect from the sensor.
    pub fn disconnect(&self) {
        self.send(MonitorCommand::Disconnect);
    }

    /// Shut the monitor down.
    pub fn shutdown(&self) {
        self.send(MonitorCommand::Shutdown);
    }

    /// Receiver for status text updates.
    pub fn status(&self) -> watch::Receiver<String> {
        self.status.subscribe()
    }

    /// Receiver for state machine snapshots.
    pub fn state(&self) -> watch::Receiver<MonitorState> {
        self.state.clone()
    }

    /// Subscribe to upload outcomes.
    pub fn subscribe_uploads(&self) -> broadcast::Receiver<UploadOutcome> {
        self.uploads.subscribe()
    }

    fn send(&self, command: MonitorCommand) {
        if self.commands.send(command).is_err() {
            debug!("Monitor stopped, dropping {:?}", command);
        }
    }
}

/// Event loop owning the scan session and the sensor connection.
pub struct SeatMonitor {
    config: MonitorConfig,
    scanner: ScanController,
    connection: ConnectionManager,
    relay: NotificationRelay,
    status: StatusBoard,
    state_tx: watch::Sender<MonitorState>,
    commands: mpsc::UnboundedReceiver<MonitorCommand>,
    radio_events: mpsc::UnboundedReceiver<RadioEvent>,
    timer_tx: mpsc::UnboundedSender<u64>,
    timer_rx: mpsc::UnboundedReceiver<u64>,
    timer: Option<JoinHandle<()>>,
}

impl SeatMonitor {
    /// Create a monitor and the handle that drives it.
    ///
    /// `radio_events` must be the event channel of `radio`.
    pub fn new(
        config: MonitorConfig,
        radio: Arc<dyn Radio>,
        authorization: Arc<dyn Authorization>,
        uploader: Arc<dyn SeatStateUploader>,
        radio_events: mpsc::UnboundedReceiver<RadioEvent>,
    ) -> (Self, MonitorHandle) {
        let filter = AdvertisementFilter::new(config.device_name.clone(), SEAT_SERVICE_UUID);
        let scanner = ScanController::new(radio.clone(), authorization.clone(), filter);
        let connection = ConnectionManager::new(radio, authorization);

        let status = StatusBoard::new();
        let uploads = UploadDispatcher::new(uploader, config.max_in_flight_uploads);
        let relay = NotificationRelay::new(status.clone(), uploads.clone());

        let (command_tx, commands) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(MonitorState::default());

        let handle = MonitorHandle {
            commands: command_tx,
            status: status.clone(),
            state: state_rx,
            uploads,
        };

        let monitor = Self {
            config,
            scanner,
            connection,
            relay,
            status,
            state_tx,
            commands,
            radio_events,
            timer_tx,
            timer_rx,
            timer: None,
        };

        (monitor, handle)
    }

    /// Current snapshot.
    pub fn state(&self) -> MonitorState {
        MonitorState {
            scan: self.scanner.status(),
            connection: self.connection.state(),
        }
    }

    /// Process inputs until [`MonitorCommand::Shutdown`] or until every
    /// [`MonitorHandle`] is dropped.
    pub async fn run(mut self) {
        info!("Seat monitor started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(MonitorCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = self.radio_events.recv() => self.handle_radio_event(event),
                Some(session) = self.timer_rx.recv() => self.handle_timer(session),
            }

            self.publish_state();
        }

        self.shutdown();
        self.publish_state();
        info!("Seat monitor stopped");
    }

    fn handle_command(&mut self, command: MonitorCommand) {
        debug!("Command: {:?}", command);

        match command {
            MonitorCommand::StartScan => self.start_scan(),
            MonitorCommand::StopScan => {
                self.cancel_timer();
                self.scanner.stop_scan();
            }
            MonitorCommand::Disconnect => {
                if self.connection.connection().is_some() {
                    self.connection.teardown();
                    self.status.show("Disconnected");
                }
            }
            MonitorCommand::Shutdown => self.shutdown(),
        }
    }

    fn start_scan(&mut self) {
        match self.scanner.start_scan(self.config.scan_window()) {
            Ok(session) => {
                let (id, deadline) = (session.id(), session.deadline());
                self.arm_timer(id, deadline);
                self.status
                    .show(format!("Scanning for {}...", self.config.device_name));
            }
            Err(e) => {
                warn!("Cannot start scan: {}", e);
                self.status.show(e.to_string());
            }
        }
    }

    fn handle_radio_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Discovered(discovery) => {
                let matched = self.scanner.handle_event(ScanEvent::Discovered(discovery));
                if let Some(peripheral) = matched {
                    self.cancel_timer();
                    self.connect(peripheral);
                }
            }
            RadioEvent::Connected { peripheral } => {
                self.signal(&peripheral, ConnectionSignal::Connected);
            }
            RadioEvent::ServicesDiscovered {
                peripheral,
                services,
            } => {
                self.signal(&peripheral, ConnectionSignal::ServicesDiscovered(services));
            }
            RadioEvent::DescriptorWritten {
                peripheral,
                success,
            } => {
                self.signal(&peripheral, ConnectionSignal::DescriptorWritten { success });
            }
            RadioEvent::Disconnected { peripheral } => {
                self.signal(&peripheral, ConnectionSignal::Disconnected);
            }
            RadioEvent::Notification {
                peripheral,
                characteristic,
                value,
            } => {
                if !self.connection.is_connection_to(&peripheral) {
                    trace!("Notification from unconnected {}", peripheral);
                    return;
                }
                match self.relay.on_notification(characteristic, &value) {
                    Err(e) if e.is_local() => debug!("Notification dropped: {}", e),
                    Err(e) => {
                        warn!("Notification handling failed: {}", e);
                        self.status.show(e.to_string());
                    }
                    Ok(_) => {}
                }
            }
        }
    }

    fn handle_timer(&mut self, session: u64) {
        let was_scanning = self.scanner.is_scanning();
        self.scanner.handle_event(ScanEvent::TimerExpired { session });

        if was_scanning && self.scanner.status() == ScanStatus::TimedOut {
            self.timer = None;
            self.status
                .show(format!("{} not found", self.config.device_name));
        }
    }

    fn connect(&mut self, peripheral: PeripheralHandle) {
        let name = peripheral.display_name().to_string();
        match self.connection.connect(peripheral) {
            Ok(()) => self.status.show(format!("Connecting to {}...", name)),
            Err(e) => {
                warn!("Cannot connect to {}: {}", name, e);
                self.status.show(e.to_string());
            }
        }
    }

    fn signal(&mut self, peripheral: &str, signal: ConnectionSignal) {
        let before = self.connection.state();

        match self.connection.handle_event(peripheral, signal) {
            Ok(after) if after != before => self.show_progress(after),
            Ok(_) => {}
            Err(e) => self.status.show(format!("Connection failed: {}", e)),
        }
    }

    fn show_progress(&self, state: ConnectionState) {
        match state {
            ConnectionState::ServicesDiscovering => {
                self.status
                    .show(format!("Connected to {}", self.config.device_name));
            }
            ConnectionState::Subscribed => self.status.show("Waiting for seat state..."),
            ConnectionState::Disconnected => self.status.show("Disconnected"),
            _ => {}
        }
    }

    fn arm_timer(&mut self, session: u64, deadline: Instant) {
        self.cancel_timer();

        let timer_tx = self.timer_tx.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = timer_tx.send(session);
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn shutdown(&mut self) {
        info!("Shutting down seat monitor");
        self.cancel_timer();
        self.scanner.stop_scan();
        self.connection.teardown();
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.state());
    }
}
