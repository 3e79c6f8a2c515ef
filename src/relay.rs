//! Notification relay.
//!
//! Turns seat characteristic notifications into readings and fans them
//! out to the status board and the upload dispatcher.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::uuids::SEAT_STATE_CHARACTERISTIC_UUID;
use crate::data::SeatReading;
use crate::error::Result;
use crate::status::StatusBoard;
use crate::upload::UploadDispatcher;

/// Decodes notifications and forwards readings.
pub struct NotificationRelay {
    characteristic: Uuid,
    status: StatusBoard,
    uploads: UploadDispatcher,
}

impl NotificationRelay {
    /// Create a relay for the seat state characteristic.
    pub fn new(status: StatusBoard, uploads: UploadDispatcher) -> Self {
        Self {
            characteristic: SEAT_STATE_CHARACTERISTIC_UUID,
            status,
            uploads,
        }
    }

    /// The upload dispatcher readings are sent to.
    pub fn uploads(&self) -> &UploadDispatcher {
        &self.uploads
    }

    /// Handle one notification.
    ///
    /// Returns `Ok(None)` for notifications from other characteristics.
    /// The status board is updated before this returns; the upload runs
    /// in the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecodeError`](crate::Error::DecodeError) for an
    /// empty payload; nothing is forwarded in that case.
    pub fn on_notification(
        &self,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<Option<SeatReading>> {
        if characteristic != self.characteristic {
            debug!("Ignoring notification from {}", characteristic);
            return Ok(None);
        }

        let reading = SeatReading::from_payload(payload).map_err(|e| {
            warn!("Dropping seat notification: {}", e);
            e
        })?;

        info!("Received seat state: {:02X?} -> {}", payload.first(), reading.state);

        self.status.show(reading.status_text());
        self.uploads.dispatch(reading);

        Ok(Some(reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SeatState;
    use crate::error::Error;
    use crate::status::IDLE_STATUS;
    use crate::upload::tests::RecordingUploader;
    use std::sync::Arc;

    fn relay(uploader: Arc<RecordingUploader>) -> (NotificationRelay, StatusBoard) {
        let status = StatusBoard::new();
        let relay = NotificationRelay::new(status.clone(), UploadDispatcher::new(uploader, 4));
        (relay, status)
    }

    #[tokio::test]
    async fn test_normal_reading_fans_out() {
        let uploader = Arc::new(RecordingUploader::ok());
        let (relay, status) = relay(uploader.clone());
        let mut outcomes = relay.uploads().subscribe();

        let reading = relay
            .on_notification(SEAT_STATE_CHARACTERISTIC_UUID, &[0x01])
            .unwrap()
            .unwrap();

        assert_eq!(reading.state, SeatState::Normal);
        assert_eq!(status.current(), "Seat State: Normal");

        outcomes.recv().await.unwrap();
        assert_eq!(uploader.bodies(), vec![r#"{"state":"Normal"}"#.to_string()]);
    }

    #[tokio::test]
    async fn test_other_byte_is_reclined() {
        let uploader = Arc::new(RecordingUploader::ok());
        let (relay, status) = relay(uploader);

        let reading = relay
            .on_notification(SEAT_STATE_CHARACTERISTIC_UUID, &[0x00])
            .unwrap()
            .unwrap();
        assert_eq!(reading.state, SeatState::Reclined);
        assert_eq!(status.current(), "Seat State: Reclined");
    }

    #[tokio::test]
    async fn test_empty_payload_dropped() {
        let uploader = Arc::new(RecordingUploader::ok());
        let (relay, status) = relay(uploader.clone());

        let result = relay.on_notification(SEAT_STATE_CHARACTERISTIC_UUID, &[]);
        assert!(matches!(result, Err(Error::DecodeError { .. })));
        assert_eq!(status.current(), IDLE_STATUS);

        tokio::task::yield_now().await;
        assert!(uploader.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_characteristic_ignored() {
        let uploader = Arc::new(RecordingUploader::ok());
        let (relay, status) = relay(uploader.clone());

        let other = Uuid::from_u128(0x0000_2a19_0000_1000_8000_00805f9b34fb);
        assert!(relay.on_notification(other, &[0x01]).unwrap().is_none());
        assert_eq!(status.current(), IDLE_STATUS);
    }

    #[tokio::test]
    async fn test_readings_shown_in_order() {
        let uploader = Arc::new(RecordingUploader::ok());
        let (relay, status) = relay(uploader);
        let mut rx = status.subscribe();

        relay
            .on_notification(SEAT_STATE_CHARACTERISTIC_UUID, &[0x01])
            .unwrap();
        assert_eq!(*rx.borrow_and_update(), "Seat State: Normal");
        relay
            .on_notification(SEAT_STATE_CHARACTERISTIC_UUID, &[0x00])
            .unwrap();
        assert_eq!(*rx.borrow_and_update(), "Seat State: Reclined");
    }
}
