//! Advertisement matching.
//!
//! Decides whether a discovered peripheral is the seat sensor, based on
//! the advertised local name and service UUIDs.

use uuid::Uuid;

use crate::ble::uuids::{SEAT_MONITOR_NAME, SEAT_SERVICE_UUID};

/// Identifier and name of a discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralHandle {
    id: String,
    name: Option<String>,
}

impl PeripheralHandle {
    /// Create a new handle from a platform identifier and optional local name.
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }

    /// The opaque platform identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The advertised local name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for display, falling back to "Unknown".
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or("Unknown")
    }
}

impl std::fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.id)
    }
}

/// A single discovery event reported by the radio.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    /// The discovered peripheral.
    pub peripheral: PeripheralHandle,
    /// Service UUIDs found in the advertisement.
    pub service_uuids: Vec<Uuid>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// Predicate that recognizes the seat sensor in advertisements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementFilter {
    name: String,
    service_uuid: Uuid,
}

impl Default for AdvertisementFilter {
    fn default() -> Self {
        Self::new(SEAT_MONITOR_NAME, SEAT_SERVICE_UUID)
    }
}

impl AdvertisementFilter {
    /// Create a filter for a device name and service UUID.
    pub fn new(name: impl Into<String>, service_uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            service_uuid,
        }
    }

    /// True iff the name matches exactly or the service UUID is advertised.
    pub fn matches(&self, name: Option<&str>, advertised_service_uuids: &[Uuid]) -> bool {
        name == Some(self.name.as_str()) || advertised_service_uuids.contains(&self.service_uuid)
    }

    /// Convenience wrapper over [`matches`](Self::matches) for a discovery event.
    pub fn matches_discovery(&self, discovery: &Discovery) -> bool {
        self.matches(discovery.peripheral.name(), &discovery.service_uuids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const OTHER_SERVICE: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);

    #[test]
    fn test_name_and_uuid_match() {
        let filter = AdvertisementFilter::default();
        assert!(filter.matches(Some("SeatMonitor"), &[SEAT_SERVICE_UUID]));
    }

    #[test]
    fn test_name_match_only() {
        let filter = AdvertisementFilter::default();
        assert!(filter.matches(Some("SeatMonitor"), &[OTHER_SERVICE]));
        assert!(filter.matches(Some("SeatMonitor"), &[]));
    }

    #[test]
    fn test_uuid_match_only() {
        let filter = AdvertisementFilter::default();
        assert!(filter.matches(Some("Fitbit"), &[OTHER_SERVICE, SEAT_SERVICE_UUID]));
        assert!(filter.matches(None, &[SEAT_SERVICE_UUID]));
    }

    #[test]
    fn test_no_match() {
        let filter = AdvertisementFilter::default();
        assert!(!filter.matches(Some("Fitbit"), &[OTHER_SERVICE]));
        assert!(!filter.matches(None, &[]));
    }

    #[test]
    fn test_name_is_case_sensitive() {
        let filter = AdvertisementFilter::default();
        assert!(!filter.matches(Some("seatmonitor"), &[]));
        assert!(!filter.matches(Some("SeatMonitor2"), &[]));
    }

    #[test]
    fn test_matches_discovery() {
        let filter = AdvertisementFilter::default();
        let discovery = Discovery {
            peripheral: PeripheralHandle::new("AA:BB", None),
            service_uuids: vec![SEAT_SERVICE_UUID],
            rssi: Some(-60),
        };
        assert!(filter.matches_discovery(&discovery));
    }

    #[test]
    fn test_handle_display() {
        let handle = PeripheralHandle::new("AA:BB", None);
        assert_eq!(handle.to_string(), "Unknown (AA:BB)");
        let handle = PeripheralHandle::new("AA:BB", Some("SeatMonitor".to_string()));
        assert_eq!(handle.to_string(), "SeatMonitor (AA:BB)");
    }

    proptest! {
        #[test]
        fn prop_matches_iff_name_or_uuid(
            name in proptest::option::of("[A-Za-z]{0,12}"),
            raw in proptest::collection::vec(any::<u128>(), 0..6),
            include_service in any::<bool>(),
        ) {
            let filter = AdvertisementFilter::default();
            let mut uuids: Vec<Uuid> = raw.into_iter().map(Uuid::from_u128).collect();
            if include_service {
                uuids.push(SEAT_SERVICE_UUID);
            }
            let expected = name.as_deref() == Some("SeatMonitor")
                || uuids.contains(&SEAT_SERVICE_UUID);
            prop_assert_eq!(filter.matches(name.as_deref(), &uuids), expected);
        }
    }
}
