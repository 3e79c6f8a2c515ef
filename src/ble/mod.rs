//! BLE communication module.
//!
//! State machines for discovering the seat sensor and subscribing to its
//! notifications, plus the [`Radio`] seam they drive and the btleplug
//! backend that implements it.

pub mod adapter;
pub mod advertising;
pub mod connection;
pub mod radio;
pub mod scanner;
pub mod uuids;

pub use adapter::BleAdapter;
pub use advertising::{AdvertisementFilter, Discovery, PeripheralHandle};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionSignal, ConnectionState};
pub use radio::{
    Authorization, AuthorizationStatus, Capability, GattCharacteristic, GattService, Radio,
    RadioEvent, StaticAuthorization,
};
pub use scanner::{ScanController, ScanEvent, ScanSession, ScanStatus};
pub use uuids::*;
