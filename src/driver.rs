//! Driver for a single Celsian sensor.
//!
//! [`SensorDriver`] owns the connection state machine, the scan controller
//! and the single-flight read queue. Public operations never block: they
//! hand requests to the [`Transport`] and return, and every outcome is
//! published later as a [`DriverEvent`].
//!
//! Transport notifications enter through [`SensorDriver::handle_event`],
//! either called directly by a platform callback or pumped from a channel by
//! [`SensorDriver::attach`].

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::btleplug_transport::BtleplugTransport;
use crate::ble::connection::{Connection, ConnectionState};
use crate::ble::profile::CharacteristicRole;
use crate::ble::read_queue::{ReadQueue, Submission};
use crate::ble::scanner::ScanController;
use crate::ble::transport::{
    CharacteristicHandle, DiscoveredServices, GattStatus, LinkState, PeripheralAddress,
    Transport, TransportEvent,
};
use crate::ble::uuids::CELSIAN_SERVICE_FILTER;
use crate::config::{DriverConfig, ReadFailurePolicy};
use crate::data::{SensorReadings, SensorValue};
use crate::dispatcher::EventDispatcher;
use crate::error::{Error, Result};
use crate::events::{CallbackHandle, DriverEvent, EventPort, ReadFailure};

/// Outcome of an accepted read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRequest {
    /// The read was issued to the transport immediately.
    Issued,
    /// Another read is in flight; this one is queued.
    Queued {
        /// Number of reads waiting, including this one.
        position: usize,
    },
}

/// Mutable driver state, guarded by a single lock.
struct DriverState {
    connection: Connection,
    scanner: ScanController,
    reads: ReadQueue,
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: DriverConfig,
    state: Mutex<DriverState>,
    dispatcher: EventDispatcher,
}

/// Driver for the Celsian environmental sensor.
pub struct SensorDriver {
    inner: Arc<Inner>,
    /// Task pumping transport events into the driver.
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SensorDriver {
    /// Create a driver on top of a transport.
    ///
    /// When called inside a tokio runtime, scan timeouts run on that runtime
    /// whichever thread later starts the scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(transport: Arc<dyn Transport>, config: DriverConfig) -> Result<Self> {
        config.validate()?;

        let state = DriverState {
            connection: Connection::new(),
            scanner: ScanController::new(
                CELSIAN_SERVICE_FILTER,
                config.scan_timeout,
                Handle::try_current().ok(),
            ),
            reads: ReadQueue::new(),
        };

        let dispatcher = EventDispatcher::new(EventPort::new(config.event_capacity));

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                config,
                state: Mutex::new(state),
                dispatcher,
            }),
            pump: Mutex::new(None),
        })
    }

    /// Create a driver using the first Bluetooth adapter through `btleplug`.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available or the configuration
    /// is invalid.
    pub async fn with_btleplug(config: DriverConfig) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let transport = BtleplugTransport::new(event_tx).await?;

        let driver = Self::new(Arc::new(transport), config)?;
        driver.attach(event_rx);

        Ok(driver)
    }

    /// Feed transport events from a channel into the driver.
    ///
    /// Replaces any previously attached channel. The pump task stops when
    /// the channel closes or the driver is dropped.
    pub fn attach(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let inner = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(driver) = inner.upgrade() else {
                    break;
                };
                driver.handle_event(event);
            }
            debug!("Transport event pump ended");
        });

        if let Some(previous) = self.pump.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Process one transport notification.
    pub fn handle_event(&self, event: TransportEvent) {
        self.inner.handle_event(event);
    }

    // === Lifecycle ===

    /// Start scanning for the sensor.
    pub fn start_scan(&self) {
        let mut state = self.inner.state.lock();
        self.inner.start_scan_locked(&mut state);
    }

    /// Stop scanning. Idempotent.
    pub fn stop_scan(&self) {
        let mut state = self.inner.state.lock();
        self.inner.stop_scan_locked(&mut state);
    }

    /// Connect to the sensor.
    ///
    /// Reuses an open link or the remembered address when available and
    /// scans otherwise. Emits [`DriverEvent::Connected`] straight away when
    /// already connected.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Disconnect from the sensor and release the link.
    pub fn disconnect(&self) {
        self.inner.shut_down(true);
    }

    /// Release the link without asking the peripheral to disconnect first.
    pub fn close(&self) {
        self.inner.shut_down(false);
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().connection.state()
    }

    /// Check if reads are accepted.
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Check if a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.inner.state.lock().scanner.is_scanning()
    }

    /// Address of the last sensor that connected successfully.
    pub fn peripheral_address(&self) -> Option<PeripheralAddress> {
        self.inner.state.lock().connection.peripheral().cloned()
    }

    /// Forget the remembered sensor so the next connect scans again.
    pub fn forget_peripheral(&self) {
        self.inner.state.lock().connection.forget_peripheral();
    }

    /// Get the driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    // === Reads ===

    /// Request a read of a role.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] unless the driver is ready, and
    /// [`Error::ReadRejected`] if the transport refuses to issue the read.
    pub fn request_read(&self, role: CharacteristicRole) -> Result<ReadRequest> {
        self.inner.request_read(role)
    }

    /// Request a read of every role, in profile order.
    pub fn read_all(&self) -> Result<()> {
        for role in CharacteristicRole::ALL {
            self.request_read(role)?;
        }
        Ok(())
    }

    /// Read the MPL temperature.
    pub fn read_mpl_temperature(&self) -> Result<ReadRequest> {
        self.request_read(CharacteristicRole::MplTemperature)
    }

    /// Read the SHT temperature.
    pub fn read_sht_temperature(&self) -> Result<ReadRequest> {
        self.request_read(CharacteristicRole::ShtTemperature)
    }

    /// Read the relative humidity.
    pub fn read_relative_humidity(&self) -> Result<ReadRequest> {
        self.request_read(CharacteristicRole::RelativeHumidity)
    }

    /// Read the barometric pressure.
    pub fn read_pressure(&self) -> Result<ReadRequest> {
        self.request_read(CharacteristicRole::Pressure)
    }

    /// Read the UVA channel.
    pub fn read_uva(&self) -> Result<ReadRequest> {
        self.request_read(CharacteristicRole::Uva)
    }

    /// Read the UVB channel.
    pub fn read_uvb(&self) -> Result<ReadRequest> {
        self.request_read(CharacteristicRole::Uvb)
    }

    /// Read the UV dummy channel.
    pub fn read_uv_dummy(&self) -> Result<ReadRequest> {
        self.request_read(CharacteristicRole::UvDummy)
    }

    /// Read UV compensation channel 1.
    pub fn read_uv_comp1(&self) -> Result<ReadRequest> {
        self.request_read(CharacteristicRole::UvComp1)
    }

    /// Read UV compensation channel 2.
    pub fn read_uv_comp2(&self) -> Result<ReadRequest> {
        self.request_read(CharacteristicRole::UvComp2)
    }

    /// The read awaiting completion, if any.
    pub fn read_in_flight(&self) -> Option<CharacteristicRole> {
        self.inner.state.lock().reads.in_flight()
    }

    /// Number of reads queued behind the in-flight one.
    pub fn pending_reads(&self) -> usize {
        self.inner.state.lock().reads.len()
    }

    // === Values & events ===

    /// Snapshot of the last-known values.
    pub fn readings(&self) -> SensorReadings {
        self.inner.dispatcher.readings()
    }

    /// Last-known value for a role.
    pub fn last_value(&self, role: CharacteristicRole) -> Option<SensorValue> {
        self.inner.dispatcher.last_value(role)
    }

    /// Subscribe to driver events.
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.inner.dispatcher.port().subscribe()
    }

    /// Register a callback for driver events.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(DriverEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.port().on_event(callback)
    }
}

impl Drop for SensorDriver {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}

impl Inner {
    fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    fn start_scan_locked(self: &Arc<Self>, state: &mut DriverState) {
        let Some(session) = state.scanner.start(self.transport()) else {
            return;
        };

        if state.connection.state() == ConnectionState::Idle {
            state.connection.set_state(ConnectionState::Scanning);
        }

        let inner: Weak<Inner> = Arc::downgrade(self);
        state.scanner.arm_timeout(move || {
            if let Some(inner) = inner.upgrade() {
                inner.on_scan_timeout(session);
            }
        });
    }

    fn stop_scan_locked(&self, state: &mut DriverState) {
        state.scanner.stop(self.transport());

        if state.connection.state() == ConnectionState::Scanning {
            state.connection.set_state(ConnectionState::Idle);
        }
    }

    fn connect(self: &Arc<Self>) {
        let mut state = self.state.lock();

        match state.connection.state() {
            ConnectionState::Ready => {
                debug!("Already connected");
                self.dispatcher.notify(DriverEvent::Connected);
                return;
            }
            current if current.is_transitioning() => {
                debug!("Connection attempt already in progress ({})", current);
                return;
            }
            _ => {}
        }

        self.dispatcher.reset_readings();

        if state.connection.is_link_open() && self.transport.reconnect() {
            info!("Reconnecting over existing link");
            state.connection.set_state(ConnectionState::Connecting);
            return;
        }

        if let Some(address) = state.connection.peripheral().cloned() {
            info!("Connecting directly to {}", address);
            state.connection.set_state(ConnectionState::Connecting);
            self.transport.connect(&address);
            return;
        }

        self.start_scan_locked(&mut state);
    }

    fn shut_down(&self, request_disconnect: bool) {
        let mut state = self.state.lock();
        self.stop_scan_locked(&mut state);

        let was_active = state.connection.state() != ConnectionState::Idle;
        if !was_active && !state.connection.is_link_open() {
            debug!("Not connected, nothing to tear down");
            return;
        }

        info!("Disconnecting from sensor");
        state.connection.set_state(ConnectionState::Disconnecting);

        if request_disconnect {
            self.transport.disconnect();
        }
        self.transport.close();
        state.connection.release_link();

        self.teardown_locked(&mut state);

        if was_active {
            self.dispatcher.notify(DriverEvent::Disconnected);
        }
    }

    /// Drop everything tied to the link and return to Idle.
    fn teardown_locked(&self, state: &mut DriverState) {
        if state.reads.is_busy() {
            debug!(
                "Dropping in-flight read and {} queued reads",
                state.reads.len()
            );
        }
        state.reads.clear();
        state.connection.reset();
        self.dispatcher.reset_readings();
    }

    /// End the current connection attempt as failed.
    fn fail_attempt_locked(&self, state: &mut DriverState) {
        state.reads.clear();
        state.connection.reset();
        self.dispatcher.notify(DriverEvent::ConnectFailed);
    }

    fn request_read(&self, role: CharacteristicRole) -> Result<ReadRequest> {
        let mut state = self.state.lock();

        if !state.connection.state().is_ready() {
            debug!("Rejecting read of {}: not connected", role);
            return Err(Error::NotConnected);
        }

        let handle = state
            .connection
            .handle(role)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: role.uuid().to_string(),
            })?;

        match state.reads.submit(role) {
            Submission::Queued { position } => {
                trace!("Queued read of {} at position {}", role, position);
                Ok(ReadRequest::Queued { position })
            }
            Submission::Issue(_) => {
                if self.transport.read_characteristic(handle) {
                    trace!("Issued read of {}", role);
                    Ok(ReadRequest::Issued)
                } else {
                    warn!("Transport refused read of {}", role);
                    // Nothing was queued behind it, so this only clears the mark.
                    state.reads.complete();
                    Err(Error::ReadRejected { role })
                }
            }
        }
    }

    /// Issue the next queued read, skipping any the transport refuses.
    fn advance_reads_locked(&self, state: &mut DriverState) {
        while let Some(next) = state.reads.complete() {
            match state.connection.handle(next) {
                Some(handle) if self.transport.read_characteristic(handle) => {
                    trace!("Issued queued read of {}", next);
                    return;
                }
                _ => {
                    warn!("Transport refused queued read of {}", next);
                    self.dispatcher
                        .dispatch_failure(next, ReadFailure::NotIssued);
                }
            }
        }
    }

    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::ScanResult {
                peripheral,
                service_uuids,
            } => self.on_scan_result(peripheral, &service_uuids),
            TransportEvent::ScanFailed { code } => self.on_scan_failed(code),
            TransportEvent::ConnectionStateChanged { state, status } => {
                self.on_connection_state_changed(state, status)
            }
            TransportEvent::ServicesDiscovered {
                status,
                peripheral,
                services,
            } => self.on_services_discovered(status, peripheral, &services),
            TransportEvent::CharacteristicRead {
                handle,
                value,
                status,
            } => self.on_characteristic_read(handle, &value, status),
            TransportEvent::CharacteristicWrite {
                handle,
                value,
                status,
            } => self.on_characteristic_write(handle, &value, status),
        }
    }

    fn on_scan_result(&self, peripheral: PeripheralAddress, service_uuids: &[Uuid]) {
        let mut state = self.state.lock();

        if !state.scanner.matches(service_uuids) {
            trace!("Ignoring scan result from {}", peripheral);
            return;
        }

        if state.connection.state() != ConnectionState::Scanning {
            debug!(
                "Ignoring sensor {} while {}",
                peripheral,
                state.connection.state()
            );
            return;
        }

        info!("Found sensor {}", peripheral);
        state.connection.set_state(ConnectionState::Connecting);
        state.scanner.stop(self.transport());
        self.transport.connect(&peripheral);
    }

    fn on_scan_failed(&self, code: i32) {
        let mut state = self.state.lock();

        if !state.scanner.is_scanning() {
            debug!("Ignoring scan failure {} outside a scan", code);
            return;
        }

        error!("Scan failed with code {}", code);
        state.scanner.abort();

        if state.connection.state() == ConnectionState::Scanning {
            state.connection.set_state(ConnectionState::Idle);
        }

        self.dispatcher.notify(DriverEvent::ConnectFailed);
    }

    fn on_scan_timeout(&self, session: u64) {
        let mut state = self.state.lock();

        if !state.scanner.expire(session, self.transport()) {
            return;
        }

        match state.connection.state() {
            ConnectionState::Connecting
            | ConnectionState::DiscoveringServices
            | ConnectionState::Ready => {
                debug!("Scan timed out after the sensor was found");
            }
            current => {
                if current == ConnectionState::Scanning {
                    state.connection.set_state(ConnectionState::Idle);
                }
                info!("No sensor found");
                self.dispatcher.notify(DriverEvent::ConnectionTimeout);
            }
        }
    }

    fn on_connection_state_changed(&self, link: LinkState, status: GattStatus) {
        let mut state = self.state.lock();
        let current = state.connection.state();

        match (link, current) {
            (LinkState::Connected, ConnectionState::Connecting) => {
                if !status.is_success() {
                    warn!("Connection failed with status {:?}", status.code());
                    self.fail_attempt_locked(&mut state);
                    return;
                }

                state.connection.link_established();

                if self.transport.discover_services() {
                    state
                        .connection
                        .set_state(ConnectionState::DiscoveringServices);
                } else {
                    error!("Failed to start service discovery");
                    self.fail_attempt_locked(&mut state);
                }
            }
            (LinkState::Connected, _) => {
                debug!("Ignoring link up while {}", current);
            }
            (LinkState::Disconnected, ConnectionState::Ready) => {
                info!("Sensor disconnected");
                state.connection.set_state(ConnectionState::Disconnecting);
                self.teardown_locked(&mut state);
                self.dispatcher.notify(DriverEvent::Disconnected);
            }
            (LinkState::Disconnected, ConnectionState::Connecting)
            | (LinkState::Disconnected, ConnectionState::DiscoveringServices) => {
                warn!(
                    "Link dropped while {} (status {:?})",
                    current,
                    status.code()
                );
                self.fail_attempt_locked(&mut state);
            }
            (LinkState::Disconnected, _) => {
                debug!("Ignoring link down while {}", current);
            }
        }
    }

    fn on_services_discovered(
        &self,
        status: GattStatus,
        peripheral: PeripheralAddress,
        services: &DiscoveredServices,
    ) {
        let mut state = self.state.lock();

        if state.connection.state() != ConnectionState::DiscoveringServices {
            debug!(
                "Ignoring service discovery result while {}",
                state.connection.state()
            );
            return;
        }

        if !status.is_success() {
            warn!("Service discovery failed with status {:?}", status.code());
            self.fail_attempt_locked(&mut state);
            return;
        }

        if state.connection.apply_discovery(peripheral, services) {
            state.connection.set_state(ConnectionState::Ready);
            info!("Sensor ready");
            self.dispatcher.notify(DriverEvent::Connected);
        } else {
            self.fail_attempt_locked(&mut state);
        }
    }

    fn on_characteristic_read(
        &self,
        handle: CharacteristicHandle,
        value: &[u8],
        status: GattStatus,
    ) {
        let mut state = self.state.lock();

        if !state.connection.state().is_ready() {
            debug!(
                "Ignoring read completion for {:?} while {}",
                handle,
                state.connection.state()
            );
            return;
        }

        let Some(role) = state.connection.role_for(handle) else {
            warn!("Ignoring read completion for unknown handle {:?}", handle);
            return;
        };

        if state.reads.in_flight() != Some(role) {
            warn!("Ignoring unexpected read completion for {}", role);
            return;
        }

        match status {
            GattStatus::Success => {
                self.dispatcher.dispatch_value(role, value);
            }
            GattStatus::Failure(code) => {
                warn!("Read of {} failed with status {}", role, code);
                self.dispatcher
                    .dispatch_failure(role, ReadFailure::Status { code });

                if self.config.read_failure_policy == ReadFailurePolicy::Stall {
                    warn!("Read queue stalled behind failed read of {}", role);
                    return;
                }
            }
        }

        self.advance_reads_locked(&mut state);
    }

    fn on_characteristic_write(
        &self,
        handle: CharacteristicHandle,
        value: &[u8],
        status: GattStatus,
    ) {
        let state = self.state.lock();

        if !state.connection.state().is_ready() {
            debug!("Ignoring write completion for {:?}", handle);
            return;
        }

        let Some(role) = state.connection.role_for(handle) else {
            warn!("Ignoring write completion for unknown handle {:?}", handle);
            return;
        };

        if status.is_success() {
            self.dispatcher.dispatch_value(role, value);
        } else {
            debug!("Write to {} failed with status {:?}", role, status.code());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::transport::MockTransport;
    use crate::ble::uuids::{CELSIAN_SERVICE_UUID, PRESSURE_UUID};
    use crate::testing::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::time::Duration;
    use CharacteristicRole::*;

    fn driver_with(config: DriverConfig) -> (SensorDriver, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let driver = SensorDriver::new(transport.clone(), config).unwrap();
        (driver, transport)
    }

    fn scan_match() -> TransportEvent {
        TransportEvent::ScanResult {
            peripheral: sensor(),
            service_uuids: vec![CELSIAN_SERVICE_UUID],
        }
    }

    fn link(state: LinkState, status: GattStatus) -> TransportEvent {
        TransportEvent::ConnectionStateChanged { state, status }
    }

    fn discovered(services: DiscoveredServices) -> TransportEvent {
        TransportEvent::ServicesDiscovered {
            status: GattStatus::Success,
            peripheral: sensor(),
            services,
        }
    }

    fn read_done(role: CharacteristicRole, seed: u16) -> TransportEvent {
        TransportEvent::CharacteristicRead {
            handle: handle_of(role),
            value: payload_for(role, seed),
            status: GattStatus::Success,
        }
    }

    fn read_failed(role: CharacteristicRole, code: i32) -> TransportEvent {
        TransportEvent::CharacteristicRead {
            handle: handle_of(role),
            value: Vec::new(),
            status: GattStatus::Failure(code),
        }
    }

    fn bring_up(driver: &SensorDriver) {
        driver.connect();
        driver.handle_event(scan_match());
        driver.handle_event(link(LinkState::Connected, GattStatus::Success));
        driver.handle_event(discovered(full_profile()));
    }

    /// A driver in the Ready state with recorded calls and events cleared.
    fn ready_driver(
        config: DriverConfig,
    ) -> (
        SensorDriver,
        Arc<RecordingTransport>,
        broadcast::Receiver<DriverEvent>,
    ) {
        let (driver, transport) = driver_with(config);
        let mut rx = driver.subscribe();
        bring_up(&driver);
        assert_eq!(driver.state(), ConnectionState::Ready);
        transport.take_calls();
        drain(&mut rx);
        (driver, transport, rx)
    }

    fn value_events(events: &[DriverEvent]) -> Vec<CharacteristicRole> {
        events
            .iter()
            .filter_map(|event| match event {
                DriverEvent::ValueChanged { role, .. } => Some(*role),
                _ => None,
            })
            .collect()
    }

    // === Connection lifecycle ===

    #[test]
    fn test_connect_from_idle_scans() {
        let (driver, transport) = driver_with(DriverConfig::default());

        driver.connect();

        assert_eq!(driver.state(), ConnectionState::Scanning);
        assert!(driver.is_scanning());
        assert_eq!(transport.calls(), vec![Call::StartScan]);
    }

    #[test]
    fn test_full_connect_flow() {
        let (driver, transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.connect();
        driver.handle_event(scan_match());
        assert_eq!(driver.state(), ConnectionState::Connecting);
        assert!(!driver.is_scanning());

        driver.handle_event(link(LinkState::Connected, GattStatus::Success));
        assert_eq!(driver.state(), ConnectionState::DiscoveringServices);

        driver.handle_event(discovered(full_profile()));
        assert_eq!(driver.state(), ConnectionState::Ready);
        assert_eq!(driver.peripheral_address(), Some(sensor()));

        assert_eq!(
            transport.calls(),
            vec![
                Call::StartScan,
                Call::StopScan,
                Call::Connect(sensor()),
                Call::DiscoverServices,
            ]
        );
        assert_eq!(drain(&mut rx), vec![DriverEvent::Connected]);
    }

    #[test]
    fn test_only_first_scan_match_connects() {
        let (driver, transport) = driver_with(DriverConfig::default());

        driver.connect();
        driver.handle_event(scan_match());
        driver.handle_event(TransportEvent::ScanResult {
            peripheral: PeripheralAddress::new("11:22:33:44:55:66"),
            service_uuids: vec![CELSIAN_SERVICE_UUID],
        });

        let connects = transport
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Connect(_)))
            .count();
        assert_eq!(connects, 1);
    }

    #[test]
    fn test_non_matching_scan_result_is_ignored() {
        let (driver, transport) = driver_with(DriverConfig::default());

        driver.connect();
        driver.handle_event(TransportEvent::ScanResult {
            peripheral: sensor(),
            service_uuids: vec![PRESSURE_UUID],
        });

        assert_eq!(driver.state(), ConnectionState::Scanning);
        assert_eq!(transport.calls(), vec![Call::StartScan]);
    }

    #[test]
    fn test_connect_while_ready_issues_no_transport_call() {
        let mut transport = MockTransport::new();
        transport.expect_start_scan().times(1).return_const(());
        transport.expect_stop_scan().times(1).return_const(());
        transport.expect_connect().times(1).return_const(());
        transport
            .expect_discover_services()
            .times(1)
            .return_const(true);

        let driver = SensorDriver::new(Arc::new(transport), DriverConfig::default()).unwrap();
        let mut rx = driver.subscribe();
        bring_up(&driver);
        assert_eq!(drain(&mut rx), vec![DriverEvent::Connected]);

        driver.connect();

        assert_eq!(driver.state(), ConnectionState::Ready);
        assert_eq!(drain(&mut rx), vec![DriverEvent::Connected]);
    }

    #[test]
    fn test_connect_while_attempt_in_progress_is_ignored() {
        let (driver, transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.connect();
        driver.handle_event(scan_match());
        transport.take_calls();

        driver.connect();

        assert!(transport.calls().is_empty());
        assert!(drain(&mut rx).is_empty());
        assert_eq!(driver.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_connect_failure_status() {
        let (driver, _transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.connect();
        driver.handle_event(scan_match());
        driver.handle_event(link(LinkState::Connected, GattStatus::Failure(133)));

        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(drain(&mut rx), vec![DriverEvent::ConnectFailed]);
    }

    #[test]
    fn test_discovery_not_started() {
        let (driver, transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();
        transport.set_discover_ok(false);

        driver.connect();
        driver.handle_event(scan_match());
        driver.handle_event(link(LinkState::Connected, GattStatus::Success));

        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(drain(&mut rx), vec![DriverEvent::ConnectFailed]);
    }

    #[test]
    fn test_link_drop_during_discovery_fails_attempt() {
        let (driver, _transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.connect();
        driver.handle_event(scan_match());
        driver.handle_event(link(LinkState::Connected, GattStatus::Success));
        driver.handle_event(link(LinkState::Disconnected, GattStatus::Failure(8)));

        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(drain(&mut rx), vec![DriverEvent::ConnectFailed]);
    }

    #[test]
    fn test_partial_profile_fails_closed() {
        let (driver, transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.connect();
        driver.handle_event(scan_match());
        driver.handle_event(link(LinkState::Connected, GattStatus::Success));
        driver.handle_event(discovered(profile_without(UvComp1)));

        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(drain(&mut rx), vec![DriverEvent::ConnectFailed]);
        assert_eq!(driver.peripheral_address(), None);
        assert!(driver.inner.state.lock().connection.characteristics().is_empty());

        transport.take_calls();
        assert!(matches!(
            driver.request_read(Uva),
            Err(Error::NotConnected)
        ));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_discovery_failure_status() {
        let (driver, _transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.connect();
        driver.handle_event(scan_match());
        driver.handle_event(link(LinkState::Connected, GattStatus::Success));
        driver.handle_event(TransportEvent::ServicesDiscovered {
            status: GattStatus::Failure(129),
            peripheral: sensor(),
            services: full_profile(),
        });

        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(drain(&mut rx), vec![DriverEvent::ConnectFailed]);
    }

    #[test]
    fn test_scan_failure() {
        let (driver, _transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.connect();
        driver.handle_event(TransportEvent::ScanFailed { code: 2 });

        assert_eq!(driver.state(), ConnectionState::Idle);
        assert!(!driver.is_scanning());
        assert_eq!(drain(&mut rx), vec![DriverEvent::ConnectFailed]);

        // A second report for the same dead scan is not surfaced again.
        driver.handle_event(TransportEvent::ScanFailed { code: 2 });
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_remote_disconnect_then_direct_reconnect() {
        let (driver, transport, mut rx) = ready_driver(DriverConfig::default());

        driver.handle_event(link(LinkState::Disconnected, GattStatus::Success));
        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(drain(&mut rx), vec![DriverEvent::Disconnected]);

        // The link handle refuses reuse, so the remembered address is used.
        driver.connect();
        assert_eq!(driver.state(), ConnectionState::Connecting);
        assert_eq!(
            transport.take_calls(),
            vec![Call::Reconnect, Call::Connect(sensor())]
        );
    }

    #[test]
    fn test_reconnect_over_open_link() {
        let (driver, transport, mut rx) = ready_driver(DriverConfig::default());
        transport.set_reconnect_ok(true);

        driver.handle_event(link(LinkState::Disconnected, GattStatus::Success));
        drain(&mut rx);

        driver.connect();
        assert_eq!(driver.state(), ConnectionState::Connecting);
        assert_eq!(transport.take_calls(), vec![Call::Reconnect]);

        driver.handle_event(link(LinkState::Connected, GattStatus::Success));
        driver.handle_event(discovered(full_profile()));
        assert_eq!(driver.state(), ConnectionState::Ready);
        assert_eq!(drain(&mut rx), vec![DriverEvent::Connected]);
    }

    #[test]
    fn test_reconnect_after_disconnect_skips_scan() {
        let (driver, transport, _rx) = ready_driver(DriverConfig::default());

        driver.disconnect();
        transport.take_calls();

        driver.connect();
        assert_eq!(driver.state(), ConnectionState::Connecting);
        assert_eq!(transport.calls(), vec![Call::Connect(sensor())]);
    }

    #[test]
    fn test_forget_peripheral_scans_again() {
        let (driver, transport, _rx) = ready_driver(DriverConfig::default());

        driver.disconnect();
        driver.forget_peripheral();
        transport.take_calls();

        driver.connect();
        assert_eq!(driver.state(), ConnectionState::Scanning);
        assert_eq!(transport.calls(), vec![Call::StartScan]);
    }

    #[test]
    fn test_disconnect_tears_down() {
        let (driver, transport, mut rx) = ready_driver(DriverConfig::default());
        driver.handle_event(TransportEvent::CharacteristicWrite {
            handle: handle_of(Pressure),
            value: vec![0x10, 0x27],
            status: GattStatus::Success,
        });
        driver.read_uva().unwrap();
        driver.read_uvb().unwrap();
        drain(&mut rx);

        driver.disconnect();

        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(driver.read_in_flight(), None);
        assert_eq!(driver.pending_reads(), 0);
        assert!(driver.readings().is_empty());
        assert!(transport.calls().ends_with(&[Call::Disconnect, Call::Close]));
        assert_eq!(drain(&mut rx), vec![DriverEvent::Disconnected]);
    }

    #[test]
    fn test_close_does_not_request_disconnect() {
        let (driver, transport, mut rx) = ready_driver(DriverConfig::default());

        driver.close();

        assert_eq!(transport.calls(), vec![Call::Close]);
        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(drain(&mut rx), vec![DriverEvent::Disconnected]);
    }

    #[test]
    fn test_disconnect_while_idle_does_nothing() {
        let (driver, transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.disconnect();

        assert!(transport.calls().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_disconnect_while_scanning_only_stops_scan() {
        let (driver, transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.connect();
        driver.disconnect();

        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(transport.calls(), vec![Call::StartScan, Call::StopScan]);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_disconnect_while_connecting_aborts_attempt() {
        let (driver, transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.connect();
        driver.handle_event(scan_match());
        transport.take_calls();

        driver.disconnect();
        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(transport.calls(), vec![Call::Disconnect, Call::Close]);
        assert_eq!(drain(&mut rx), vec![DriverEvent::Disconnected]);

        // The late link-up for the abandoned attempt changes nothing.
        driver.handle_event(link(LinkState::Connected, GattStatus::Success));
        assert_eq!(driver.state(), ConnectionState::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_start_and_stop_scan() {
        let (driver, transport) = driver_with(DriverConfig::default());

        driver.start_scan();
        driver.start_scan();
        assert_eq!(driver.state(), ConnectionState::Scanning);

        driver.stop_scan();
        driver.stop_scan();
        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(transport.calls(), vec![Call::StartScan, Call::StopScan]);
    }

    // === Scan timeout ===

    #[tokio::test(start_paused = true)]
    async fn test_scan_timeout_reports_connection_timeout() {
        let (driver, transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.connect();
        tokio::time::sleep(Duration::from_millis(10_001)).await;

        assert_eq!(driver.state(), ConnectionState::Idle);
        assert_eq!(transport.calls(), vec![Call::StartScan, Call::StopScan]);
        assert_eq!(drain(&mut rx), vec![DriverEvent::ConnectionTimeout]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_timeout_after_match_is_silent() {
        let (driver, _transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.connect();
        driver.handle_event(scan_match());
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(driver.state(), ConnectionState::Connecting);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scan_timeout_when_connect_called_from_plain_thread() {
        let config = DriverConfig::default().with_scan_timeout(Duration::from_millis(200));
        let (driver, _transport) = driver_with(config);
        let driver = Arc::new(driver);
        let mut rx = driver.subscribe();

        let caller = driver.clone();
        std::thread::spawn(move || caller.connect()).join().unwrap();
        assert_eq!(driver.state(), ConnectionState::Scanning);

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(driver.state(), ConnectionState::Idle);
        assert!(!driver.is_scanning());
        assert_eq!(drain(&mut rx), vec![DriverEvent::ConnectionTimeout]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_scan_cancels_timeout() {
        let (driver, _transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();

        driver.start_scan();
        driver.stop_scan();
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_scan_timeout() {
        let config = DriverConfig::default().with_scan_timeout(Duration::from_secs(2));
        let (driver, _transport) = driver_with(config);
        let mut rx = driver.subscribe();

        driver.connect();
        tokio::time::sleep(Duration::from_millis(2_100)).await;

        assert_eq!(drain(&mut rx), vec![DriverEvent::ConnectionTimeout]);
    }

    // === Reads ===

    #[test]
    fn test_request_read_requires_ready() {
        let (driver, transport) = driver_with(DriverConfig::default());

        assert!(matches!(
            driver.request_read(MplTemperature),
            Err(Error::NotConnected)
        ));
        tokio_test::assert_err!(driver.read_uv_comp2());
        assert!(transport.calls().is_empty());

        driver.connect();
        transport.take_calls();
        tokio_test::assert_err!(driver.read_pressure());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_reads_complete_in_request_order() {
        let (driver, transport, mut rx) = ready_driver(DriverConfig::default());
        let order = [Pressure, MplTemperature, Uvb, RelativeHumidity];

        assert_eq!(driver.request_read(order[0]).unwrap(), ReadRequest::Issued);
        assert_eq!(
            driver.request_read(order[1]).unwrap(),
            ReadRequest::Queued { position: 1 }
        );
        driver.request_read(order[2]).unwrap();
        driver.request_read(order[3]).unwrap();

        // Only the first read reaches the transport until it completes.
        assert_eq!(transport.reads(), vec![handle_of(Pressure)]);

        for (i, role) in order.iter().enumerate() {
            assert_eq!(driver.read_in_flight(), Some(*role));
            driver.handle_event(read_done(*role, 20 + i as u16));
        }

        assert_eq!(
            transport.reads(),
            order.iter().map(|r| handle_of(*r)).collect::<Vec<_>>()
        );
        assert_eq!(value_events(&drain(&mut rx)), order.to_vec());
        assert_eq!(driver.read_in_flight(), None);
        assert_eq!(driver.pending_reads(), 0);
        assert_eq!(driver.last_value(MplTemperature), Some(SensorValue::Temperature(21.0)));
    }

    #[test]
    fn test_duplicate_reads_are_not_coalesced() {
        let (driver, transport, mut rx) = ready_driver(DriverConfig::default());

        driver.read_uva().unwrap();
        driver.read_uva().unwrap();
        driver.read_uva().unwrap();
        assert_eq!(driver.pending_reads(), 2);

        for seed in 1..=3 {
            driver.handle_event(read_done(Uva, seed));
        }

        assert_eq!(transport.reads().len(), 3);
        assert_eq!(value_events(&drain(&mut rx)), vec![Uva, Uva, Uva]);
        assert_eq!(driver.last_value(Uva), Some(SensorValue::Raw(3)));
    }

    #[test]
    fn test_read_all_issues_one_at_a_time() {
        let (driver, transport, mut rx) = ready_driver(DriverConfig::default());

        driver.read_all().unwrap();
        assert_eq!(transport.reads().len(), 1);
        assert_eq!(driver.pending_reads(), 8);

        for (i, role) in CharacteristicRole::ALL.iter().enumerate() {
            driver.handle_event(read_done(*role, i as u16));
        }

        assert_eq!(
            value_events(&drain(&mut rx)),
            CharacteristicRole::ALL.to_vec()
        );
        assert!(driver.readings().is_complete());
    }

    #[test]
    fn test_read_failure_advances_queue() {
        let (driver, transport, mut rx) = ready_driver(DriverConfig::default());

        driver.read_sht_temperature().unwrap();
        driver.read_relative_humidity().unwrap();
        driver.handle_event(read_failed(ShtTemperature, 137));

        assert_eq!(
            drain(&mut rx),
            vec![DriverEvent::ReadFailed {
                role: ShtTemperature,
                reason: ReadFailure::Status { code: 137 },
            }]
        );
        assert_eq!(driver.read_in_flight(), Some(RelativeHumidity));
        assert_eq!(
            transport.reads(),
            vec![handle_of(ShtTemperature), handle_of(RelativeHumidity)]
        );
    }

    #[test]
    fn test_read_failure_stall_policy() {
        let config = DriverConfig::default().with_read_failure_policy(ReadFailurePolicy::Stall);
        let (driver, transport, mut rx) = ready_driver(config);

        driver.read_sht_temperature().unwrap();
        driver.read_relative_humidity().unwrap();
        driver.handle_event(read_failed(ShtTemperature, 137));

        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(driver.read_in_flight(), Some(ShtTemperature));
        assert_eq!(transport.reads(), vec![handle_of(ShtTemperature)]);
        assert_eq!(
            driver.read_pressure().unwrap(),
            ReadRequest::Queued { position: 2 }
        );

        // Only a disconnect clears the stall.
        driver.handle_event(link(LinkState::Disconnected, GattStatus::Success));
        assert_eq!(driver.read_in_flight(), None);
    }

    #[test]
    fn test_malformed_payload_advances_queue() {
        let (driver, _transport, mut rx) = ready_driver(DriverConfig::default());

        driver.read_mpl_temperature().unwrap();
        driver.read_uv_dummy().unwrap();
        driver.handle_event(TransportEvent::CharacteristicRead {
            handle: handle_of(MplTemperature),
            value: vec![0x00, 0x00],
            status: GattStatus::Success,
        });

        assert_eq!(
            drain(&mut rx),
            vec![DriverEvent::ReadFailed {
                role: MplTemperature,
                reason: ReadFailure::Malformed {
                    expected: 8,
                    actual: 2
                },
            }]
        );
        assert_eq!(driver.last_value(MplTemperature), None);
        assert_eq!(driver.read_in_flight(), Some(UvDummy));
    }

    #[test]
    fn test_rejected_immediate_read() {
        let (driver, transport, _rx) = ready_driver(DriverConfig::default());
        transport.set_read_ok(false);

        assert!(matches!(
            driver.read_uvb(),
            Err(Error::ReadRejected { role: Uvb })
        ));
        assert_eq!(driver.read_in_flight(), None);

        transport.set_read_ok(true);
        assert_eq!(driver.read_uvb().unwrap(), ReadRequest::Issued);
    }

    #[test]
    fn test_rejected_queued_read_is_skipped() {
        let (driver, transport, mut rx) = ready_driver(DriverConfig::default());

        driver.read_uva().unwrap();
        driver.read_uvb().unwrap();
        driver.read_uv_comp1().unwrap();

        // The transport refuses UVB but accepts UV comp1 after it.
        transport.set_read_ok(false);
        driver.handle_event(read_done(Uva, 1));
        assert_eq!(driver.read_in_flight(), None);

        let events = drain(&mut rx);
        assert!(events.contains(&DriverEvent::ReadFailed {
            role: Uvb,
            reason: ReadFailure::NotIssued,
        }));
        assert!(events.contains(&DriverEvent::ReadFailed {
            role: UvComp1,
            reason: ReadFailure::NotIssued,
        }));

        transport.set_read_ok(true);
        driver.read_uva().unwrap();
        driver.read_uvb().unwrap();
        transport.set_read_ok(false);
        driver.handle_event(read_done(Uva, 2));
        assert_eq!(driver.read_in_flight(), None);
        assert_eq!(
            drain(&mut rx),
            vec![
                DriverEvent::ValueChanged {
                    role: Uva,
                    value: SensorValue::Raw(2),
                },
                DriverEvent::ReadFailed {
                    role: Uvb,
                    reason: ReadFailure::NotIssued,
                },
            ]
        );
    }

    #[test]
    fn test_late_completion_after_disconnect_is_ignored() {
        let (driver, _transport, mut rx) = ready_driver(DriverConfig::default());

        driver.read_pressure().unwrap();
        driver.disconnect();
        drain(&mut rx);

        driver.handle_event(read_done(Pressure, 1013));

        assert_eq!(driver.state(), ConnectionState::Idle);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(driver.last_value(Pressure), None);
    }

    #[test]
    fn test_remote_disconnect_mid_read_drops_reads() {
        let (driver, _transport, mut rx) = ready_driver(DriverConfig::default());

        driver.read_pressure().unwrap();
        driver.read_uva().unwrap();
        driver.handle_event(link(LinkState::Disconnected, GattStatus::Failure(8)));

        assert_eq!(drain(&mut rx), vec![DriverEvent::Disconnected]);
        assert_eq!(driver.read_in_flight(), None);
        assert_eq!(driver.pending_reads(), 0);

        driver.handle_event(read_done(Pressure, 1013));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_stale_completion_after_reconnect_is_ignored() {
        let (driver, transport, mut rx) = ready_driver(DriverConfig::default());

        driver.read_pressure().unwrap();
        driver.disconnect();
        driver.connect();
        driver.handle_event(link(LinkState::Connected, GattStatus::Success));
        driver.handle_event(discovered(full_profile()));
        assert!(driver.is_ready());
        drain(&mut rx);
        transport.take_calls();

        // Completion for the read abandoned by the disconnect.
        driver.handle_event(read_done(Pressure, 1013));

        assert!(drain(&mut rx).is_empty());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_unexpected_completion_is_ignored() {
        let (driver, _transport, mut rx) = ready_driver(DriverConfig::default());

        driver.read_uva().unwrap();
        driver.handle_event(read_done(Uvb, 5));
        driver.handle_event(TransportEvent::CharacteristicRead {
            handle: CharacteristicHandle(0xFFFF),
            value: vec![0, 0],
            status: GattStatus::Success,
        });

        assert!(drain(&mut rx).is_empty());
        assert_eq!(driver.read_in_flight(), Some(Uva));
    }

    #[test]
    fn test_write_completion_publishes_value() {
        let (driver, transport, mut rx) = ready_driver(DriverConfig::default());

        driver.read_uva().unwrap();
        driver.handle_event(TransportEvent::CharacteristicWrite {
            handle: handle_of(UvComp2),
            value: vec![0xE8, 0x03],
            status: GattStatus::Success,
        });
        driver.handle_event(TransportEvent::CharacteristicWrite {
            handle: handle_of(UvComp1),
            value: vec![0x01, 0x00],
            status: GattStatus::Failure(3),
        });

        assert_eq!(
            drain(&mut rx),
            vec![DriverEvent::ValueChanged {
                role: UvComp2,
                value: SensorValue::Raw(1000),
            }]
        );
        assert_eq!(driver.last_value(UvComp1), None);
        assert_eq!(driver.read_in_flight(), Some(Uva));
        assert_eq!(transport.reads().len(), 1);
    }

    #[test]
    fn test_readings_cleared_on_link_loss() {
        let (driver, _transport, _rx) = ready_driver(DriverConfig::default());

        driver.read_uva().unwrap();
        driver.handle_event(read_done(Uva, 9));
        assert_eq!(driver.readings().raw(Uva), Some(9));

        driver.handle_event(link(LinkState::Disconnected, GattStatus::Success));
        assert!(driver.readings().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let transport = Arc::new(RecordingTransport::new());
        let config = DriverConfig::default().with_event_capacity(0);
        assert!(matches!(
            SensorDriver::new(transport, config),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[tokio::test]
    async fn test_attach_pumps_events() {
        let (driver, transport) = driver_with(DriverConfig::default());
        let mut rx = driver.subscribe();
        let (tx, events) = mpsc::unbounded_channel();
        driver.attach(events);

        driver.connect();
        tx.send(scan_match()).unwrap();
        tx.send(link(LinkState::Connected, GattStatus::Success))
            .unwrap();
        tx.send(discovered(full_profile())).unwrap();

        assert_eq!(rx.recv().await.unwrap(), DriverEvent::Connected);
        assert!(driver.is_ready());
        assert!(transport.calls().contains(&Call::DiscoverServices));
    }

    proptest! {
        #[test]
        fn prop_reads_complete_in_request_order(indices in proptest::collection::vec(0usize..9, 1..24)) {
            let (driver, transport, mut rx) = ready_driver(DriverConfig::default());
            let roles: Vec<_> = indices.iter().map(|i| CharacteristicRole::ALL[*i]).collect();

            for role in &roles {
                driver.request_read(*role).unwrap();
            }
            prop_assert_eq!(transport.reads().len(), 1);

            let mut seed = 0u16;
            while let Some(role) = driver.read_in_flight() {
                driver.handle_event(read_done(role, seed));
                seed += 1;
            }

            prop_assert_eq!(value_events(&drain(&mut rx)), roles.clone());
            prop_assert_eq!(
                transport.reads(),
                roles.iter().map(|r| handle_of(*r)).collect::<Vec<_>>()
            );
            prop_assert_eq!(driver.pending_reads(), 0);
        }
    }
}
