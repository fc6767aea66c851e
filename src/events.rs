//! Events published by the driver.
//!
//! Every outcome of a driver operation is delivered as a [`DriverEvent`] on a
//! single broadcast channel. Listeners either hold a receiver from
//! [`EventPort::subscribe`] or register a callback with
//! [`EventPort::on_event`]; the driver never owns its listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

use crate::ble::profile::CharacteristicRole;
use crate::data::SensorValue;

/// Why a characteristic read produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFailure {
    /// The transport completed the read with a failure status.
    Status {
        /// Transport error code.
        code: i32,
    },
    /// The payload was too short for the role's encoding.
    Malformed {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },
    /// The transport refused to issue the queued read.
    NotIssued,
}

impl std::fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { code } => write!(f, "transport status {}", code),
            Self::Malformed { expected, actual } => {
                write!(f, "expected {} bytes, got {}", expected, actual)
            }
            Self::NotIssued => write!(f, "read not issued"),
        }
    }
}

/// Notification from the driver to its listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// The sensor is connected and every characteristic is resolved.
    Connected,
    /// A scan or connection attempt failed.
    ConnectFailed,
    /// The connection to the sensor was closed or lost.
    Disconnected,
    /// No sensor was found before the scan timed out.
    ConnectionTimeout,
    /// A new value was decoded for a role.
    ValueChanged {
        /// The role that changed.
        role: CharacteristicRole,
        /// The decoded value.
        value: SensorValue,
    },
    /// A read for a role failed.
    ReadFailed {
        /// The role whose read failed.
        role: CharacteristicRole,
        /// What went wrong.
        reason: ReadFailure,
    },
}

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Outbound side of the driver.
pub struct EventPort {
    /// Channel for driver events.
    event_tx: broadcast::Sender<DriverEvent>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
}

impl EventPort {
    /// Create a port buffering up to `capacity` events per listener.
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            event_tx,
            callback_counter: AtomicU64::new(0),
        }
    }

    /// Publish an event. Events with no listeners are dropped.
    pub fn publish(&self, event: DriverEvent) {
        trace!("Publishing {:?}", event);
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to driver events.
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.event_tx.subscribe()
    }

    /// Register a callback for driver events.
    ///
    /// The callback runs on a tokio task until the returned handle is
    /// dropped or unregistered.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(DriverEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.event_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Event callback lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Number of live subscribers.
    pub fn listener_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}
