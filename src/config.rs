//! Driver configuration.

use std::time::Duration;

use crate::ble::uuids::SCAN_TIMEOUT;
use crate::error::{Error, Result};

/// What the read queue does when a characteristic read fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReadFailurePolicy {
    /// Report the failure and issue the next queued read.
    #[default]
    Advance,
    /// Report the failure and keep the failed read marked in flight. Every
    /// later read queues up behind it until the link drops.
    Stall,
}

/// Configuration for a [`SensorDriver`](crate::SensorDriver).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriverConfig {
    /// How long a scan runs before reporting a connection timeout.
    pub scan_timeout: Duration,
    /// Capacity of the driver event channel.
    pub event_capacity: usize,
    /// Queue behaviour after a failed read.
    pub read_failure_policy: ReadFailurePolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            scan_timeout: SCAN_TIMEOUT,
            event_capacity: 64,
            read_failure_policy: ReadFailurePolicy::default(),
        }
    }
}

impl DriverConfig {
    /// Set the scan timeout.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the read failure policy.
    pub fn with_read_failure_policy(mut self, policy: ReadFailurePolicy) -> Self {
        self.read_failure_policy = policy;
        self
    }

    /// Check the configuration for values the driver cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for a zero scan timeout or a zero
    /// event capacity.
    pub fn validate(&self) -> Result<()> {
        if self.scan_timeout.is_zero() {
            return Err(Error::InvalidParameter {
                name: "scan_timeout".to_string(),
                value: format!("{:?}", self.scan_timeout),
            });
        }

        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter {
                name: "event_capacity".to_string(),
                value: self.event_capacity.to_string(),
            });
        }

        Ok(())
    }
}
