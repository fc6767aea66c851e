//! Test doubles for the transport boundary.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

use crate::ble::profile::CharacteristicRole;
use crate::ble::transport::{
    CharacteristicHandle, DiscoveredServices, PeripheralAddress, ServiceFilter, Transport,
};
use crate::ble::uuids::CELSIAN_SERVICE_UUID;
use crate::events::DriverEvent;

pub(crate) const SENSOR: &str = "C0:FF:EE:00:00:01";

/// A transport call as seen by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    StartScan,
    StopScan,
    Connect(PeripheralAddress),
    Reconnect,
    DiscoverServices,
    Read(CharacteristicHandle),
    Disconnect,
    Close,
}

/// Transport that records every call and never emits events on its own.
pub(crate) struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    reconnect_ok: AtomicBool,
    discover_ok: AtomicBool,
    read_ok: AtomicBool,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reconnect_ok: AtomicBool::new(false),
            discover_ok: AtomicBool::new(true),
            read_ok: AtomicBool::new(true),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub(crate) fn reads(&self) -> Vec<CharacteristicHandle> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Read(handle) => Some(*handle),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn set_reconnect_ok(&self, ok: bool) {
        self.reconnect_ok.store(ok, Ordering::SeqCst);
    }

    pub(crate) fn set_discover_ok(&self, ok: bool) {
        self.discover_ok.store(ok, Ordering::SeqCst);
    }

    pub(crate) fn set_read_ok(&self, ok: bool) {
        self.read_ok.store(ok, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl Transport for RecordingTransport {
    fn start_scan(&self, _filter: &ServiceFilter) {
        self.record(Call::StartScan);
    }

    fn stop_scan(&self) {
        self.record(Call::StopScan);
    }

    fn connect(&self, peripheral: &PeripheralAddress) {
        self.record(Call::Connect(peripheral.clone()));
    }

    fn reconnect(&self) -> bool {
        self.record(Call::Reconnect);
        self.reconnect_ok.load(Ordering::SeqCst)
    }

    fn discover_services(&self) -> bool {
        self.record(Call::DiscoverServices);
        self.discover_ok.load(Ordering::SeqCst)
    }

    fn read_characteristic(&self, handle: CharacteristicHandle) -> bool {
        self.record(Call::Read(handle));
        self.read_ok.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        self.record(Call::Disconnect);
    }

    fn close(&self) {
        self.record(Call::Close);
    }
}

pub(crate) fn sensor() -> PeripheralAddress {
    PeripheralAddress::new(SENSOR)
}

/// Handle the fake device assigns to a role.
pub(crate) fn handle_of(role: CharacteristicRole) -> CharacteristicHandle {
    let index = CharacteristicRole::ALL
        .iter()
        .position(|r| *r == role)
        .unwrap_or_default();
    CharacteristicHandle(0x10 + index as u16)
}

/// Discovery result exposing every role.
pub(crate) fn full_profile() -> DiscoveredServices {
    let mut services = DiscoveredServices::new();
    for role in CharacteristicRole::ALL {
        services.insert(CELSIAN_SERVICE_UUID, role.uuid(), handle_of(role));
    }
    services
}

/// Discovery result with one role missing.
pub(crate) fn profile_without(missing: CharacteristicRole) -> DiscoveredServices {
    let mut services = DiscoveredServices::new();
    for role in CharacteristicRole::ALL {
        if role != missing {
            services.insert(CELSIAN_SERVICE_UUID, role.uuid(), handle_of(role));
        }
    }
    services
}

/// Payload the fake device returns for a role.
pub(crate) fn payload_for(role: CharacteristicRole, seed: u16) -> Vec<u8> {
    if role.is_temperature() {
        f64::from(seed).to_le_bytes().to_vec()
    } else {
        seed.to_le_bytes().to_vec()
    }
}

/// Every event currently buffered in the receiver.
pub(crate) fn drain(rx: &mut broadcast::Receiver<DriverEvent>) -> Vec<DriverEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
