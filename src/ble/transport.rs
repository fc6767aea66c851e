//! The boundary between the driver and the platform BLE stack.
//!
//! The driver calls into a [`Transport`] to scan, connect and read, and the
//! platform reports outcomes back as [`TransportEvent`]s. Every `Transport`
//! method is fire-and-forget: it must return promptly and must never deliver
//! an event synchronously from inside the call, since the driver holds its
//! state lock while calling the transport.

use std::collections::HashMap;
use uuid::Uuid;

/// Stable address of a peripheral, used to reconnect without scanning.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralAddress(pub String);

impl PeripheralAddress {
    /// Create an address from any string-like identifier.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque transport handle for a discovered characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacteristicHandle(pub u16);

/// Status reported by the transport for a GATT operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattStatus {
    /// The operation succeeded.
    Success,
    /// The operation failed with a transport-specific code.
    Failure(i32),
}

impl GattStatus {
    /// Check if the status is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Failure code, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Success => None,
            Self::Failure(code) => Some(*code),
        }
    }
}

/// Link-level connection state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The link to the peripheral is up.
    Connected,
    /// The link to the peripheral is down.
    Disconnected,
}

/// Service filter applied to scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceFilter {
    /// Service UUID to look for.
    pub uuid: Uuid,
    /// Bits of the UUID that must match.
    pub mask: Uuid,
}

impl ServiceFilter {
    /// Check whether an advertised service UUID passes the filter.
    pub fn matches(&self, uuid: &Uuid) -> bool {
        let mask = self.mask.as_u128();
        uuid.as_u128() & mask == self.uuid.as_u128() & mask
    }
}

/// The characteristics found by a service discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredServices {
    characteristics: HashMap<(Uuid, Uuid), CharacteristicHandle>,
}

impl DiscoveredServices {
    /// Create an empty discovery result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a characteristic found under a service.
    pub fn insert(&mut self, service: Uuid, characteristic: Uuid, handle: CharacteristicHandle) {
        self.characteristics.insert((service, characteristic), handle);
    }

    /// Look up the handle for a characteristic within a service.
    pub fn resolve(&self, service: &Uuid, characteristic: &Uuid) -> Option<CharacteristicHandle> {
        self.characteristics
            .get(&(*service, *characteristic))
            .copied()
    }

    /// Number of characteristics discovered.
    pub fn len(&self) -> usize {
        self.characteristics.len()
    }

    /// Check if discovery found nothing.
    pub fn is_empty(&self) -> bool {
        self.characteristics.is_empty()
    }
}

/// Asynchronous notification from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A device advertising the given services was seen.
    ScanResult {
        /// Address of the advertising device.
        peripheral: PeripheralAddress,
        /// Service UUIDs in the advertisement.
        service_uuids: Vec<Uuid>,
    },
    /// The scan could not be started or was aborted.
    ScanFailed {
        /// Transport error code.
        code: i32,
    },
    /// The link state changed.
    ConnectionStateChanged {
        /// New link state.
        state: LinkState,
        /// Status of the change.
        status: GattStatus,
    },
    /// Service discovery finished.
    ServicesDiscovered {
        /// Status of the discovery.
        status: GattStatus,
        /// Address of the connected device.
        peripheral: PeripheralAddress,
        /// Everything discovery found.
        services: DiscoveredServices,
    },
    /// A characteristic read completed.
    CharacteristicRead {
        /// Handle that was read.
        handle: CharacteristicHandle,
        /// Raw payload.
        value: Vec<u8>,
        /// Status of the read.
        status: GattStatus,
    },
    /// A characteristic write completed.
    CharacteristicWrite {
        /// Handle that was written.
        handle: CharacteristicHandle,
        /// Raw payload now held by the characteristic.
        value: Vec<u8>,
        /// Status of the write.
        status: GattStatus,
    },
}

/// Platform BLE capability used by the driver.
///
/// Methods returning `bool` report whether the request was accepted for
/// execution; the outcome still arrives later as a [`TransportEvent`].
///
/// Completions are matched to requests by handle only. A read or discovery
/// issued on a link that has since gone down or been closed must not be
/// reported, so a late completion can never be taken for one on the next
/// link.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Start scanning for devices matching the filter.
    fn start_scan(&self, filter: &ServiceFilter);

    /// Stop an active scan.
    fn stop_scan(&self);

    /// Open a connection to the given peripheral.
    fn connect(&self, peripheral: &PeripheralAddress);

    /// Re-open the connection on an existing link handle.
    ///
    /// Returns `false` if there is no link handle to reuse.
    fn reconnect(&self) -> bool;

    /// Request service discovery on the connected peripheral.
    fn discover_services(&self) -> bool;

    /// Request a read of the given characteristic.
    fn read_characteristic(&self, handle: CharacteristicHandle) -> bool;

    /// Ask the peripheral to disconnect.
    fn disconnect(&self);

    /// Release the link handle and everything attached to it.
    fn close(&self);
}
