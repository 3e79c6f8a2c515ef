//! Data structures for seat readings.
//!
//! Wire decoding of the seat state byte and the JSON records exchanged
//! with the collector backend.

pub mod seat;

pub use seat::{ApiResponse, SeatReading, SeatState, SeatStateRecord};
