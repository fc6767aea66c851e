//! BLE communication module.
//!
//! This module provides the Bluetooth Low Energy pieces of the driver:
//! the transport boundary, the sensor's GATT profile, scanning, the
//! connection lifecycle and the read queue.

pub mod btleplug_transport;
pub mod connection;
pub mod profile;
pub mod read_queue;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use btleplug_transport::BtleplugTransport;
pub use connection::{Connection, ConnectionState};
pub use profile::{CharacteristicRole, ResolvedCharacteristics};
pub use read_queue::{ReadQueue, Submission};
pub use scanner::ScanController;
pub use transport::{
    CharacteristicHandle, DiscoveredServices, GattStatus, LinkState, PeripheralAddress,
    ServiceFilter, Transport, TransportEvent,
};
pub use uuids::*;
