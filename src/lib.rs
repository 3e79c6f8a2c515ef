// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # seat-monitor-ble
//!
//! A Rust client for the SeatMonitor Bluetooth Low Energy seat posture
//! sensor. It finds the sensor, subscribes to its seat state
//! characteristic, shows each reading and forwards it to an HTTP
//! collector backend.
//!
//! ## Features
//!
//! - **Sensor Discovery**: Time-boxed scan matching by name or service UUID
//! - **Subscription Handshake**: Connect, discover services, enable notifications
//! - **Live Status**: Latest reading published on a watch channel
//! - **Uploads**: Each reading POSTed to the collector in the background
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use seat_monitor_ble::{
//!     BleAdapter, HttpUploader, MonitorConfig, Result, SeatMonitor, StaticAuthorization,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = MonitorConfig::default();
//!     let (radio, radio_events) = BleAdapter::new().await?;
//!     let uploader = HttpUploader::with_timeout(&config.backend_url, config.request_timeout())?;
//!
//!     let (monitor, handle) = SeatMonitor::new(
//!         config,
//!         Arc::new(radio),
//!         Arc::new(StaticAuthorization::granted()),
//!         Arc::new(uploader),
//!         radio_events,
//!     );
//!     let task = tokio::spawn(monitor.run());
//!
//!     handle.start_scan();
//!     let mut status = handle.status();
//!     while status.changed().await.is_ok() {
//!         println!("{}", *status.borrow());
//!     }
//!
//!     task.await.ok();
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.

// Public modules
pub mod ble;
pub mod config;
pub mod data;
pub mod error;
pub mod monitor;
pub mod relay;
pub mod status;
pub mod upload;

// Re-exports for convenience
pub use ble::adapter::BleAdapter;
pub use ble::advertising::{AdvertisementFilter, Discovery, PeripheralHandle};
pub use ble::connection::{ConnectionManager, ConnectionState, FailureReason};
pub use ble::radio::{Authorization, Capability, Radio, RadioEvent, StaticAuthorization};
pub use ble::scanner::{ScanController, ScanStatus};
pub use config::MonitorConfig;
pub use data::{ApiResponse, SeatReading, SeatState, SeatStateRecord};
pub use error::{Error, Result};
pub use monitor::{MonitorCommand, MonitorHandle, MonitorState, SeatMonitor};
pub use relay::NotificationRelay;
pub use status::StatusBoard;
pub use upload::{HttpUploader, SeatStateUploader, UploadDispatcher, UploadOutcome};
