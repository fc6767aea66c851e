// Allow derivable impls for clarity
#![allow(clippy::derivable_impls)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # celsian-ble
//!
//! A Rust driver for the Celsian environmental sensor over Bluetooth Low
//! Energy.
//!
//! The sensor exposes one GATT service with nine read-only characteristics:
//! two temperatures, relative humidity, barometric pressure and five UV
//! channels. The driver finds the sensor by its service UUID, connects,
//! resolves the characteristics and serves read requests one at a time.
//!
//! ## Features
//!
//! - **Discovery**: Scan for the sensor with a bounded timeout
//! - **Reconnection**: Reuse the open link or the remembered address
//! - **Serialized Reads**: At most one read in flight, completed in request order
//! - **Typed Values**: Temperatures as `f64` degrees Celsius, other channels as `u16`
//! - **Derived Values**: Average temperature and UV index
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use celsian_ble::{DriverConfig, DriverEvent, Result, SensorDriver};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let driver = SensorDriver::with_btleplug(DriverConfig::default()).await?;
//!     let mut events = driver.subscribe();
//!
//!     driver.connect();
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             DriverEvent::Connected => driver.read_all()?,
//!             DriverEvent::ValueChanged { role, value } => println!("{}: {}", role, value),
//!             DriverEvent::ConnectionTimeout | DriverEvent::ConnectFailed => break,
//!             _ => {}
//!         }
//!     }
//!
//!     driver.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Transports
//!
//! [`SensorDriver::new`] accepts any [`Transport`]. Platform callbacks are
//! fed back through [`SensorDriver::handle_event`] or a channel passed to
//! [`SensorDriver::attach`].
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
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod config;
pub mod data;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod events;
pub mod protocol;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use config::{DriverConfig, ReadFailurePolicy};
pub use driver::{ReadRequest, SensorDriver};
pub use error::{Error, Result};
pub use events::{CallbackHandle, DriverEvent, ReadFailure};
pub use utils::{celsius_to_fahrenheit, pascals_to_millibars};

// Re-export commonly used types from submodules
pub use ble::connection::ConnectionState;
pub use ble::profile::CharacteristicRole;
pub use ble::transport::{
    CharacteristicHandle, DiscoveredServices, GattStatus, LinkState, PeripheralAddress,
    ServiceFilter, Transport, TransportEvent,
};
pub use data::{Reading, SensorReadings, SensorValue};
