//! BLE scanning functionality.
//!
//! Provides the scan controller that owns the bounded discovery window
//! and reports the seat sensor at most once per session.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::ble::advertising::{AdvertisementFilter, Discovery, PeripheralHandle};
use crate::ble::radio::{Authorization, Capability, Radio};
use crate::error::{Error, Result};

/// Status of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanStatus {
    /// No session has been started.
    #[default]
    Idle,
    /// The discovery window is open.
    Scanning,
    /// The sensor was found.
    Matched,
    /// The window elapsed without a match.
    TimedOut,
    /// The scan was stopped by the caller.
    ExplicitlyStopped,
}

impl ScanStatus {
    /// Check if the session has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Matched | Self::TimedOut | Self::ExplicitlyStopped)
    }

    /// Check if the discovery window is open.
    pub fn is_scanning(&self) -> bool {
        matches!(self, Self::Scanning)
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Matched => write!(f, "Matched"),
            Self::TimedOut => write!(f, "Timed out"),
            Self::ExplicitlyStopped => write!(f, "Stopped"),
        }
    }
}

/// One bounded discovery window.
#[derive(Debug, Clone)]
pub struct ScanSession {
    id: u64,
    status: ScanStatus,
    started_at: Instant,
    deadline: Instant,
    matched: Option<PeripheralHandle>,
}

impl ScanSession {
    /// Session identifier, unique per controller.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current status.
    pub fn status(&self) -> ScanStatus {
        self.status
    }

    /// When the window was opened.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// When the window closes if nothing matches.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The matched peripheral, once found.
    pub fn matched(&self) -> Option<&PeripheralHandle> {
        self.matched.as_ref()
    }
}

/// Inputs accepted by the scan controller.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A peripheral was seen by the radio.
    Discovered(Discovery),
    /// The timer armed for a session fired.
    TimerExpired {
        /// The session the timer belongs to.
        session: u64,
    },
}

/// Owns the single scan session and its transitions.
pub struct ScanController {
    radio: Arc<dyn Radio>,
    authorization: Arc<dyn Authorization>,
    filter: AdvertisementFilter,
    session: Option<ScanSession>,
    next_session_id: u64,
}

impl ScanController {
    /// Create a new scan controller.
    pub fn new(
        radio: Arc<dyn Radio>,
        authorization: Arc<dyn Authorization>,
        filter: AdvertisementFilter,
    ) -> Self {
        Self {
            radio,
            authorization,
            filter,
            session: None,
            next_session_id: 1,
        }
    }

    /// Status of the current or most recent session.
    pub fn status(&self) -> ScanStatus {
        self.session
            .as_ref()
            .map(ScanSession::status)
            .unwrap_or_default()
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        self.status().is_scanning()
    }

    /// The current or most recent session.
    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    /// Open a new discovery window.
    ///
    /// The caller is responsible for delivering
    /// [`ScanEvent::TimerExpired`] at the returned session's deadline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterUnavailable`] if the radio is off or absent,
    /// [`Error::AlreadyScanning`] if a session is live, and
    /// [`Error::PermissionDenied`] if scanning is not authorized.
    pub fn start_scan(&mut self, timeout: Duration) -> Result<&ScanSession> {
        if !self.radio.adapter_available() {
            return Err(Error::AdapterUnavailable);
        }

        if self.is_scanning() {
            return Err(Error::AlreadyScanning);
        }

        if !self.authorization.status(Capability::Scan).is_granted() {
            return Err(Error::PermissionDenied {
                capability: Capability::Scan,
            });
        }

        self.radio.start_scan()?;

        let id = self.next_session_id;
        self.next_session_id += 1;

        let started_at = Instant::now();
        info!("Scan {} started ({} ms window)", id, timeout.as_millis());

        Ok(self.session.insert(ScanSession {
            id,
            status: ScanStatus::Scanning,
            started_at,
            deadline: started_at + timeout,
            matched: None,
        }))
    }

    /// Stop the live session. Stopping an ended session is a no-op.
    pub fn stop_scan(&mut self) {
        match self.session.as_mut() {
            Some(session) if session.status.is_scanning() => {
                self.radio.stop_scan();
                session.status = ScanStatus::ExplicitlyStopped;
                info!("Scan {} stopped", session.id);
            }
            _ => debug!("Not scanning, ignoring stop request"),
        }
    }

    /// Process one event. Returns the matched peripheral the first time
    /// the filter accepts a discovery in the live session.
    pub fn handle_event(&mut self, event: ScanEvent) -> Option<PeripheralHandle> {
        let session = match self.session.as_mut() {
            Some(session) if session.status.is_scanning() => session,
            _ => {
                trace!("No live scan session, dropping {:?}", event);
                return None;
            }
        };

        match event {
            ScanEvent::Discovered(discovery) => {
                debug!(
                    "Device found: {}, address: {}",
                    discovery.peripheral.display_name(),
                    discovery.peripheral.id()
                );
                for uuid in &discovery.service_uuids {
                    trace!("  advertised service: {}", uuid);
                }

                if !self.filter.matches_discovery(&discovery) {
                    return None;
                }

                self.radio.stop_scan();
                session.status = ScanStatus::Matched;
                session.matched = Some(discovery.peripheral.clone());
                info!("Seat sensor found: {}", discovery.peripheral);

                Some(discovery.peripheral)
            }
            ScanEvent::TimerExpired { session: id } => {
                if id != session.id {
                    debug!("Ignoring timer for stale scan {}", id);
                    return None;
                }

                self.radio.stop_scan();
                session.status = ScanStatus::TimedOut;
                info!("Scan {} window elapsed without a match", id);

                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::radio::{MockRadio, StaticAuthorization};
    use crate::ble::uuids::SEAT_SERVICE_UUID;
    use tokio_test::{assert_err, assert_ok};

    const WINDOW: Duration = Duration::from_millis(30_000);

    fn radio(stop_calls: usize) -> MockRadio {
        let mut radio = MockRadio::new();
        radio.expect_adapter_available().return_const(true);
        radio.expect_start_scan().times(1).returning(|| Ok(()));
        radio.expect_stop_scan().times(stop_calls).return_const(());
        radio
    }

    fn controller(radio: MockRadio) -> ScanController {
        ScanController::new(
            Arc::new(radio),
            Arc::new(StaticAuthorization::granted()),
            AdvertisementFilter::default(),
        )
    }

    fn discovery(id: &str, name: Option<&str>) -> ScanEvent {
        ScanEvent::Discovered(Discovery {
            peripheral: PeripheralHandle::new(id, name.map(str::to_string)),
            service_uuids: Vec::new(),
            rssi: Some(-55),
        })
    }

    #[tokio::test]
    async fn test_match_emitted_once() {
        let mut scanner = controller(radio(1));
        assert_ok!(scanner.start_scan(WINDOW));

        assert!(scanner.handle_event(discovery("11", Some("Other"))).is_none());
        let found = scanner.handle_event(discovery("22", Some("SeatMonitor")));
        assert_eq!(found.as_ref().map(|p| p.id()), Some("22"));

        // Duplicate discoveries arrive before the radio fully stops.
        assert!(scanner
            .handle_event(discovery("22", Some("SeatMonitor")))
            .is_none());
        assert!(scanner
            .handle_event(discovery("33", Some("SeatMonitor")))
            .is_none());

        assert_eq!(scanner.status(), ScanStatus::Matched);
        assert_eq!(
            scanner.session().and_then(|s| s.matched()).map(|p| p.id()),
            Some("22")
        );
    }

    #[tokio::test]
    async fn test_match_by_service_uuid() {
        let mut scanner = controller(radio(1));
        assert_ok!(scanner.start_scan(WINDOW));

        let found = scanner.handle_event(ScanEvent::Discovered(Discovery {
            peripheral: PeripheralHandle::new("44", None),
            service_uuids: vec![SEAT_SERVICE_UUID],
            rssi: None,
        }));
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_timer_expiry() {
        let mut scanner = controller(radio(1));
        let id = scanner.start_scan(WINDOW).map(|s| s.id()).unwrap();

        assert!(scanner
            .handle_event(ScanEvent::TimerExpired { session: id })
            .is_none());
        assert_eq!(scanner.status(), ScanStatus::TimedOut);

        // A discovery after the window closed is not a match.
        assert!(scanner
            .handle_event(discovery("22", Some("SeatMonitor")))
            .is_none());
        assert_eq!(scanner.status(), ScanStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_timer_after_match_is_ignored() {
        let mut scanner = controller(radio(1));
        let id = scanner.start_scan(WINDOW).map(|s| s.id()).unwrap();

        assert!(scanner
            .handle_event(discovery("22", Some("SeatMonitor")))
            .is_some());
        assert!(scanner
            .handle_event(ScanEvent::TimerExpired { session: id })
            .is_none());
        assert_eq!(scanner.status(), ScanStatus::Matched);
    }

    #[tokio::test]
    async fn test_stale_timer_does_not_end_new_session() {
        let mut radio = MockRadio::new();
        radio.expect_adapter_available().return_const(true);
        radio.expect_start_scan().times(2).returning(|| Ok(()));
        radio.expect_stop_scan().times(1).return_const(());
        let mut scanner = controller(radio);

        let first = scanner.start_scan(WINDOW).map(|s| s.id()).unwrap();
        scanner.stop_scan();
        let second = scanner.start_scan(WINDOW).map(|s| s.id()).unwrap();
        assert_ne!(first, second);

        scanner.handle_event(ScanEvent::TimerExpired { session: first });
        assert_eq!(scanner.status(), ScanStatus::Scanning);
    }

    #[tokio::test]
    async fn test_stop_scan_is_idempotent() {
        let mut scanner = controller(radio(1));
        assert_ok!(scanner.start_scan(WINDOW));

        scanner.stop_scan();
        scanner.stop_scan();
        assert_eq!(scanner.status(), ScanStatus::ExplicitlyStopped);
        assert!(scanner
            .handle_event(discovery("22", Some("SeatMonitor")))
            .is_none());
    }

    #[test]
    fn test_stop_without_session_is_noop() {
        let mut radio = MockRadio::new();
        radio.expect_stop_scan().never();
        let mut scanner = controller(radio);
        scanner.stop_scan();
        assert_eq!(scanner.status(), ScanStatus::Idle);
    }

    #[tokio::test]
    async fn test_already_scanning() {
        let mut scanner = controller(radio(0));
        assert_ok!(scanner.start_scan(WINDOW));
        assert!(matches!(
            scanner.start_scan(WINDOW),
            Err(Error::AlreadyScanning)
        ));
    }

    #[test]
    fn test_adapter_unavailable() {
        let mut radio = MockRadio::new();
        radio.expect_adapter_available().return_const(false);
        radio.expect_start_scan().never();
        let mut scanner = controller(radio);

        assert!(matches!(
            scanner.start_scan(WINDOW),
            Err(Error::AdapterUnavailable)
        ));
        assert_eq!(scanner.status(), ScanStatus::Idle);
    }

    #[test]
    fn test_permission_denied() {
        let mut radio = MockRadio::new();
        radio.expect_adapter_available().return_const(true);
        radio.expect_start_scan().never();
        let mut scanner = ScanController::new(
            Arc::new(radio),
            Arc::new(StaticAuthorization {
                scan: false,
                connect: true,
            }),
            AdvertisementFilter::default(),
        );

        let result = scanner.start_scan(WINDOW);
        assert!(matches!(
            result,
            Err(Error::PermissionDenied {
                capability: Capability::Scan
            })
        ));
    }

    #[test]
    fn test_radio_start_failure_leaves_idle() {
        let mut radio = MockRadio::new();
        radio.expect_adapter_available().return_const(true);
        radio
            .expect_start_scan()
            .returning(|| Err(Error::AdapterUnavailable));
        let mut scanner = controller(radio);

        assert_err!(scanner.start_scan(WINDOW));
        assert_eq!(scanner.status(), ScanStatus::Idle);
    }

    #[tokio::test]
    async fn test_deadline_from_timeout() {
        let mut scanner = controller(radio(0));
        let session = scanner.start_scan(WINDOW).unwrap();
        assert_eq!(session.deadline() - session.started_at(), WINDOW);
    }

    #[test]
    fn test_scan_status() {
        assert!(!ScanStatus::Idle.is_terminal());
        assert!(!ScanStatus::Scanning.is_terminal());
        assert!(ScanStatus::Matched.is_terminal());
        assert!(ScanStatus::TimedOut.is_terminal());
        assert!(ScanStatus::ExplicitlyStopped.is_terminal());
        assert_eq!(format!("{}", ScanStatus::TimedOut), "Timed out");
    }
}
