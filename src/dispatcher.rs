//! Decoding of characteristic payloads into published sensor values.

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::ble::profile::CharacteristicRole;
use crate::data::{SensorReadings, SensorValue};
use crate::error::Error;
use crate::events::{DriverEvent, EventPort, ReadFailure};
use crate::protocol::decode_value;

/// Turns raw completions into typed events and keeps the last-known values.
pub struct EventDispatcher {
    /// Outbound event port.
    port: EventPort,
    /// Last decoded value per role.
    readings: RwLock<SensorReadings>,
}

impl EventDispatcher {
    /// Create a dispatcher publishing on `port`.
    pub fn new(port: EventPort) -> Self {
        Self {
            port,
            readings: RwLock::new(SensorReadings::new()),
        }
    }

    /// The outbound event port.
    pub fn port(&self) -> &EventPort {
        &self.port
    }

    /// Publish a lifecycle event.
    pub fn notify(&self, event: DriverEvent) {
        self.port.publish(event);
    }

    /// Decode a payload for `role`, cache it and publish it.
    ///
    /// A malformed payload is reported as a read failure for that role and
    /// leaves every cached value untouched. Returns the decoded value.
    pub fn dispatch_value(&self, role: CharacteristicRole, payload: &[u8]) -> Option<SensorValue> {
        match decode_value(role, payload) {
            Ok(value) => {
                debug!("{} = {}", role, value);
                self.readings.write().update(role, value);
                self.port.publish(DriverEvent::ValueChanged { role, value });
                Some(value)
            }
            Err(Error::InvalidPayload {
                expected, actual, ..
            }) => {
                warn!(
                    "Malformed {} payload: expected {} bytes, got {}",
                    role, expected, actual
                );
                self.dispatch_failure(role, ReadFailure::Malformed { expected, actual });
                None
            }
            Err(e) => {
                warn!("Failed to decode {}: {}", role, e);
                self.dispatch_failure(role, ReadFailure::NotIssued);
                None
            }
        }
    }

    /// Publish a read failure for `role`.
    pub fn dispatch_failure(&self, role: CharacteristicRole, reason: ReadFailure) {
        self.port.publish(DriverEvent::ReadFailed { role, reason });
    }

    /// Mark every value unknown.
    pub fn reset_readings(&self) {
        self.readings.write().clear();
    }

    /// Snapshot of the last-known values.
    pub fn readings(&self) -> SensorReadings {
        self.readings.read().clone()
    }

    /// Last-known value for a role.
    pub fn last_value(&self, role: CharacteristicRole) -> Option<SensorValue> {
        self.readings.read().value(role)
    }
}
