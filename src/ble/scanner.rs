//! BLE scanning functionality.
//!
//! Tracks the scan session, its timeout and the service filter used to
//! recognise the Celsian sensor in scan results.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::transport::{ServiceFilter, Transport};

/// Controls the scan for the sensor.
///
/// Each call to [`ScanController::start`] opens a new scan session. The
/// timeout task of a session reports back with its session number so that a
/// timer belonging to a stopped or superseded scan is ignored.
#[derive(Debug)]
pub struct ScanController {
    /// Filter the scan and its results are matched against.
    filter: ServiceFilter,
    /// How long a scan session may run.
    timeout: Duration,
    /// Runtime the timeout task is spawned on.
    runtime: Option<Handle>,
    /// Whether the transport is currently scanning.
    scanning: bool,
    /// Current scan session number.
    session: u64,
    /// Handle to the timeout task.
    timer: Option<JoinHandle<()>>,
}

impl ScanController {
    /// Create a scan controller.
    ///
    /// Timeouts are spawned on `runtime`, so scans may be started from
    /// threads outside the runtime. Without one, the runtime of the calling
    /// thread is used when there is one.
    pub fn new(filter: ServiceFilter, timeout: Duration, runtime: Option<Handle>) -> Self {
        Self {
            filter,
            timeout,
            runtime,
            scanning: false,
            session: 0,
            timer: None,
        }
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// The current scan session number.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// The filter scans are issued with.
    pub fn filter(&self) -> &ServiceFilter {
        &self.filter
    }

    /// Start a scan session.
    ///
    /// Returns the new session number, or `None` if a scan is already
    /// running.
    pub fn start(&mut self, transport: &dyn Transport) -> Option<u64> {
        if self.scanning {
            debug!("Already scanning, ignoring start request");
            return None;
        }

        self.session += 1;
        self.scanning = true;

        info!("Starting BLE scan for {}", self.filter.uuid);
        transport.start_scan(&self.filter);

        Some(self.session)
    }

    /// Arm the timeout for the current session.
    ///
    /// `on_timeout` runs on the tokio runtime once the timeout elapses unless
    /// the session is stopped first. Without any runtime no timeout is armed.
    pub fn arm_timeout<F>(&mut self, on_timeout: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel_timeout();

        let Some(runtime) = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
        else {
            warn!("No tokio runtime available, scan will run until stopped");
            return;
        };

        let timeout = self.timeout;
        self.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            on_timeout();
        }));
    }

    /// Stop the current scan session. Idempotent.
    ///
    /// Returns `true` if a scan was actually running.
    pub fn stop(&mut self, transport: &dyn Transport) -> bool {
        self.cancel_timeout();

        if !self.scanning {
            return false;
        }

        info!("Stopping BLE scan");
        self.scanning = false;
        transport.stop_scan();
        true
    }

    /// Forget the current session after the transport reported a scan
    /// failure. The transport scan is already dead, so it is not stopped.
    pub fn abort(&mut self) {
        self.cancel_timeout();
        self.scanning = false;
    }

    /// Handle the timeout of `session`.
    ///
    /// Returns `true` if the session was still running and has now been
    /// stopped; `false` for a stale timer.
    pub fn expire(&mut self, session: u64, transport: &dyn Transport) -> bool {
        if session != self.session || !self.scanning {
            debug!("Ignoring stale scan timeout for session {}", session);
            return false;
        }

        // The timer task is the caller; dropping the handle detaches it.
        self.timer = None;
        self.scanning = false;

        info!("Scan timed out after {:?}", self.timeout);
        transport.stop_scan();
        true
    }

    /// Check whether any advertised service passes the filter.
    pub fn matches(&self, service_uuids: &[Uuid]) -> bool {
        service_uuids.iter().any(|uuid| self.filter.matches(uuid))
    }

    fn cancel_timeout(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        self.cancel_timeout();
    }
}
