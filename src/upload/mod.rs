//! Seat state uploads.
//!
//! Each reading is sent to the collector by an independent background
//! task. In-flight requests are capped by a semaphore so a notification
//! storm cannot fan out without bound; excess tasks wait for a permit.

pub mod http;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::data::{ApiResponse, SeatReading, SeatState, SeatStateRecord};
use crate::error::Result;

pub use http::HttpUploader;

/// Request sender for the collector backend.
#[async_trait]
pub trait SeatStateUploader: Send + Sync {
    /// `POST /api/seat-state`.
    async fn send_seat_state(&self, record: &SeatStateRecord) -> Result<ApiResponse>;

    /// `GET /api/seat-states`, oldest first.
    async fn seat_states(&self) -> Result<Vec<SeatStateRecord>>;
}

/// Result of one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// The state that was uploaded.
    pub state: SeatState,
    /// Whether the collector accepted it.
    pub success: bool,
    /// Server message on success, error text on failure.
    pub message: Option<String>,
}

/// Spawns one upload task per reading against a shared uploader.
#[derive(Clone)]
pub struct UploadDispatcher {
    uploader: Arc<dyn SeatStateUploader>,
    permits: Arc<Semaphore>,
    outcome_tx: broadcast::Sender<UploadOutcome>,
    failures: Arc<AtomicU64>,
}

impl UploadDispatcher {
    /// Create a dispatcher allowing `max_in_flight` concurrent requests.
    pub fn new(uploader: Arc<dyn SeatStateUploader>, max_in_flight: usize) -> Self {
        let (outcome_tx, _) = broadcast::channel(32);

        Self {
            uploader,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            outcome_tx,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to upload outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadOutcome> {
        self.outcome_tx.subscribe()
    }

    /// Number of failed uploads so far.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Upload a reading in the background. Never blocks the caller.
    ///
    /// Every reading is delivered. The task is spawned immediately and
    /// parks on the semaphore while `max_in_flight` requests are running,
    /// so readings arriving faster than the collector answers queue up as
    /// parked tasks (one `SeatReading` each) rather than being dropped.
    pub fn dispatch(&self, reading: SeatReading) -> JoinHandle<()> {
        let uploader = self.uploader.clone();
        let permits = self.permits.clone();
        let outcome_tx = self.outcome_tx.clone();
        let failures = self.failures.clone();

        tokio::spawn(async move {
            // The semaphore is never closed.
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let state = reading.state;
            let outcome = match uploader.send_seat_state(&SeatStateRecord::from(state)).await {
                Ok(response) => {
                    info!(
                        "Seat state '{}' uploaded successfully: {}",
                        state, response.message
                    );
                    UploadOutcome {
                        state,
                        success: true,
                        message: Some(response.message),
                    }
                }
                Err(e) => {
                    error!("Failed to upload seat state '{}': {}", state, e);
                    failures.fetch_add(1, Ordering::SeqCst);
                    UploadOutcome {
                        state,
                        success: false,
                        message: Some(e.to_string()),
                    }
                }
            };

            let _ = outcome_tx.send(outcome);
        })
    }
}
