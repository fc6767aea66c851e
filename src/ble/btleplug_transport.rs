//! [`Transport`] backed by the platform Bluetooth stack through `btleplug`.
//!
//! Every call spawns the async `btleplug` operation on the runtime the
//! transport was created on and reports the outcome as a [`TransportEvent`]
//! on an unbounded channel, usually handed to
//! [`SensorDriver::attach`](crate::SensorDriver::attach).

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::transport::{
    CharacteristicHandle, DiscoveredServices, GattStatus, LinkState, PeripheralAddress,
    ServiceFilter, Transport, TransportEvent,
};
use crate::error::{Error, Result};

/// Status reported when a `btleplug` operation fails. `btleplug` errors carry
/// no GATT status code.
pub const TRANSPORT_ERROR: i32 = -1;

/// Generation counter of the link. Every open or loss of a link starts a
/// new generation, and completions of work spawned in an older generation
/// are dropped.
#[derive(Debug, Default)]
struct LinkEpoch(AtomicU64);

impl LinkEpoch {
    fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }
}

struct Shared {
    adapter: Adapter,
    runtime: Handle,
    events: mpsc::UnboundedSender<TransportEvent>,
    /// Peripherals reported by the current or an earlier scan.
    seen: RwLock<HashMap<PeripheralAddress, Peripheral>>,
    /// Peripheral of the current link.
    link: RwLock<Option<Peripheral>>,
    /// Characteristics of the current link, indexed by handle.
    characteristics: RwLock<Vec<Characteristic>>,
    epoch: LinkEpoch,
    scan_task: Mutex<Option<JoinHandle<()>>>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn send(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!("Transport event dropped, receiver is gone");
        }
    }

    fn send_link(&self, state: LinkState, status: GattStatus) {
        self.send(TransportEvent::ConnectionStateChanged { state, status });
    }
}

/// BLE transport using the first Bluetooth adapter of the host.
pub struct BtleplugTransport {
    shared: Arc<Shared>,
}

impl BtleplugTransport {
    /// Create a transport on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(events: mpsc::UnboundedSender<TransportEvent>) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter, events))
    }

    /// Create a transport on a specific adapter.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_adapter(adapter: Adapter, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            shared: Arc::new(Shared {
                adapter,
                runtime: Handle::current(),
                events,
                seen: RwLock::new(HashMap::new()),
                link: RwLock::new(None),
                characteristics: RwLock::new(Vec::new()),
                epoch: LinkEpoch::default(),
                scan_task: Mutex::new(None),
                watch_task: Mutex::new(None),
            }),
        }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.shared.adapter
    }
}

impl Transport for BtleplugTransport {
    fn start_scan(&self, filter: &ServiceFilter) {
        let shared = self.shared.clone();
        let scan_filter = scan_filter(filter);

        let handle = self.shared.runtime.spawn(async move {
            let mut events = match shared.adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to get adapter events: {}", e);
                    shared.send(TransportEvent::ScanFailed {
                        code: TRANSPORT_ERROR,
                    });
                    return;
                }
            };

            if let Err(e) = shared.adapter.start_scan(scan_filter).await {
                error!("Failed to start scan: {}", e);
                shared.send(TransportEvent::ScanFailed {
                    code: TRANSPORT_ERROR,
                });
                return;
            }

            while let Some(event) = events.next().await {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        report_peripheral(&shared, &id, None).await;
                    }
                    CentralEvent::ServicesAdvertisement { id, services } => {
                        report_peripheral(&shared, &id, Some(services)).await;
                    }
                    _ => {}
                }
            }

            debug!("Scan event loop ended");
        });

        if let Some(previous) = self.shared.scan_task.lock().replace(handle) {
            previous.abort();
        }
    }

    fn stop_scan(&self) {
        if let Some(task) = self.shared.scan_task.lock().take() {
            task.abort();
        }

        let shared = self.shared.clone();
        self.shared.runtime.spawn(async move {
            if let Err(e) = shared.adapter.stop_scan().await {
                debug!("Failed to stop scan cleanly: {}", e);
            }
        });
    }

    fn connect(&self, address: &PeripheralAddress) {
        if let Some(peripheral) = self.shared.seen.read().get(address).cloned() {
            open_link(&self.shared, peripheral);
            return;
        }

        // Not seen by this transport: look it up among the adapter's
        // known peripherals.
        let shared = self.shared.clone();
        let address = address.clone();

        self.shared.runtime.spawn(async move {
            let peripherals = match shared.adapter.peripherals().await {
                Ok(peripherals) => peripherals,
                Err(e) => {
                    warn!("Failed to list peripherals: {}", e);
                    Vec::new()
                }
            };

            match find_known(peripherals, &address, |p| p.id().to_string()) {
                Ok(peripheral) => open_link(&shared, peripheral),
                Err(e) => {
                    warn!("{}", e);
                    shared.send_link(
                        LinkState::Disconnected,
                        GattStatus::Failure(TRANSPORT_ERROR),
                    );
                }
            }
        });
    }

    fn reconnect(&self) -> bool {
        let Some(peripheral) = self.shared.link.read().clone() else {
            return false;
        };

        open_link(&self.shared, peripheral);
        true
    }

    fn discover_services(&self) -> bool {
        let Some(peripheral) = self.shared.link.read().clone() else {
            return false;
        };

        let shared = self.shared.clone();
        let epoch = self.shared.epoch.current();
        self.shared.runtime.spawn(async move {
            let address = PeripheralAddress::new(peripheral.id().to_string());
            let outcome = peripheral.discover_services().await;

            if !shared.epoch.is_current(epoch) {
                debug!("Dropping service discovery of a closed link to {}", address);
                return;
            }

            if let Err(e) = outcome {
                warn!("Service discovery failed: {}", e);
                shared.send(TransportEvent::ServicesDiscovered {
                    status: GattStatus::Failure(TRANSPORT_ERROR),
                    peripheral: address,
                    services: DiscoveredServices::new(),
                });
                return;
            }

            let (characteristics, services) = service_table(&peripheral.services());
            debug!("Discovered {} characteristics", characteristics.len());
            *shared.characteristics.write() = characteristics;

            shared.send(TransportEvent::ServicesDiscovered {
                status: GattStatus::Success,
                peripheral: address,
                services,
            });
        });

        true
    }

    fn read_characteristic(&self, handle: CharacteristicHandle) -> bool {
        let Some(peripheral) = self.shared.link.read().clone() else {
            return false;
        };
        let Some(characteristic) = self
            .shared
            .characteristics
            .read()
            .get(usize::from(handle.0))
            .cloned()
        else {
            return false;
        };

        let shared = self.shared.clone();
        let epoch = self.shared.epoch.current();
        self.shared.runtime.spawn(async move {
            let outcome = peripheral.read(&characteristic).await;

            if !shared.epoch.is_current(epoch) {
                debug!(
                    "Dropping read of {} issued on a closed link",
                    characteristic.uuid
                );
                return;
            }

            let event = match outcome {
                Ok(value) => {
                    trace!(
                        "Read {} bytes from characteristic {}",
                        value.len(),
                        characteristic.uuid
                    );
                    TransportEvent::CharacteristicRead {
                        handle,
                        value,
                        status: GattStatus::Success,
                    }
                }
                Err(e) => {
                    warn!("Read of {} failed: {}", characteristic.uuid, e);
                    TransportEvent::CharacteristicRead {
                        handle,
                        value: Vec::new(),
                        status: GattStatus::Failure(TRANSPORT_ERROR),
                    }
                }
            };
            shared.send(event);
        });

        true
    }

    fn disconnect(&self) {
        let Some(peripheral) = self.shared.link.read().clone() else {
            return;
        };

        self.shared.runtime.spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                warn!("Error during disconnect: {}", e);
            }
        });
    }

    fn close(&self) {
        if let Some(task) = self.shared.watch_task.lock().take() {
            task.abort();
        }
        self.shared.epoch.advance();
        self.shared.link.write().take();
        self.shared.characteristics.write().clear();
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        if let Some(task) = self.shared.scan_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.shared.watch_task.lock().take() {
            task.abort();
        }
    }
}

/// Report a peripheral seen while scanning.
async fn report_peripheral(shared: &Arc<Shared>, id: &PeripheralId, services: Option<Vec<Uuid>>) {
    let peripheral = match shared.adapter.peripheral(id).await {
        Ok(p) => p,
        Err(e) => {
            trace!("Failed to get peripheral: {}", e);
            return;
        }
    };

    let service_uuids = match services {
        Some(services) => services,
        None => match peripheral.properties().await {
            Ok(Some(properties)) => properties.services,
            _ => return,
        },
    };

    let address = PeripheralAddress::new(id.to_string());
    shared.seen.write().insert(address.clone(), peripheral);

    shared.send(TransportEvent::ScanResult {
        peripheral: address,
        service_uuids,
    });
}

/// Open the link to `peripheral` and report the outcome.
fn open_link(shared: &Arc<Shared>, peripheral: Peripheral) {
    let task_shared = shared.clone();

    shared.runtime.spawn(async move {
        match peripheral.connect().await {
            Ok(()) => {
                debug!("Link opened to {}", peripheral.id());
                task_shared.epoch.advance();
                *task_shared.link.write() = Some(peripheral.clone());
                watch_disconnect(&task_shared, peripheral.id());
                task_shared.send_link(LinkState::Connected, GattStatus::Success);
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", peripheral.id(), e);
                task_shared.send_link(
                    LinkState::Disconnected,
                    GattStatus::Failure(TRANSPORT_ERROR),
                );
            }
        }
    });
}

/// Report the link going down once the adapter sees `id` disconnect.
fn watch_disconnect(shared: &Arc<Shared>, id: PeripheralId) {
    let task_shared = shared.clone();

    let handle = shared.runtime.spawn(async move {
        let mut events = match task_shared.adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                error!("Failed to get adapter events: {}", e);
                return;
            }
        };

        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(disconnected) = event {
                if disconnected == id {
                    debug!("Device disconnected: {:?}", id);
                    task_shared.epoch.advance();
                    task_shared.send_link(LinkState::Disconnected, GattStatus::Success);
                    break;
                }
            }
        }
    });

    if let Some(previous) = shared.watch_task.lock().replace(handle) {
        previous.abort();
    }
}

/// Pick the peripheral whose id renders as `address`.
fn find_known<T>(
    candidates: impl IntoIterator<Item = T>,
    address: &PeripheralAddress,
    id_of: impl Fn(&T) -> String,
) -> Result<T> {
    candidates
        .into_iter()
        .find(|candidate| id_of(candidate) == address.as_str())
        .ok_or_else(|| Error::PeripheralNotFound {
            address: address.to_string(),
        })
}

/// Scan filter for `btleplug`. The platform filter matches whole UUIDs;
/// masked matching is left to the driver.
fn scan_filter(filter: &ServiceFilter) -> ScanFilter {
    ScanFilter {
        services: vec![filter.uuid],
    }
}

/// Assign handles to the characteristics of a discovered service set.
///
/// The handle of a characteristic is its index in the returned vector.
fn service_table(services: &BTreeSet<Service>) -> (Vec<Characteristic>, DiscoveredServices) {
    let mut characteristics = Vec::new();
    let mut table = DiscoveredServices::new();

    for service in services {
        for characteristic in &service.characteristics {
            let Ok(index) = u16::try_from(characteristics.len()) else {
                warn!("Too many characteristics, ignoring the rest");
                return (characteristics, table);
            };

            trace!(
                "Found characteristic: {} in service {}",
                characteristic.uuid,
                service.uuid
            );
            table.insert(
                service.uuid,
                characteristic.uuid,
                CharacteristicHandle(index),
            );
            characteristics.push(characteristic.clone());
        }
    }

    (characteristics, table)
}
