//! BLE connection lifecycle.
//!
//! Tracks the connection state of the sensor, the remembered peripheral
//! address and the characteristics resolved for the current link.

use tracing::{debug, info, warn};

use crate::ble::profile::{CharacteristicRole, ResolvedCharacteristics};
use crate::ble::transport::{CharacteristicHandle, DiscoveredServices, PeripheralAddress};

/// Connection state of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    #[default]
    Idle,
    /// Scanning for the sensor.
    Scanning,
    /// Waiting for the transport to open the link.
    Connecting,
    /// Link is up, waiting for service discovery.
    DiscoveringServices,
    /// All characteristics resolved; reads are accepted.
    Ready,
    /// Tearing the link down.
    Disconnecting,
}

impl ConnectionState {
    /// Check if reads can be issued.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check if a connection attempt is underway.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting | Self::DiscoveringServices)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            Self::Scanning | Self::Connecting | Self::DiscoveringServices | Self::Disconnecting
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::DiscoveringServices => write!(f, "DiscoveringServices"),
            Self::Ready => write!(f, "Ready"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Connection bookkeeping for the single sensor.
#[derive(Debug, Default)]
pub struct Connection {
    /// Current connection state.
    state: ConnectionState,
    /// Address of the last sensor that completed discovery.
    peripheral: Option<PeripheralAddress>,
    /// Whether the transport holds a link handle that can be reconnected.
    link_open: bool,
    /// Characteristics resolved for the current link.
    characteristics: ResolvedCharacteristics,
}

impl Connection {
    /// Create an idle connection with no remembered peripheral.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Address of the last sensor that completed discovery.
    pub fn peripheral(&self) -> Option<&PeripheralAddress> {
        self.peripheral.as_ref()
    }

    /// Forget the remembered peripheral so the next connect scans again.
    pub fn forget_peripheral(&mut self) {
        if let Some(address) = self.peripheral.take() {
            info!("Forgetting peripheral {}", address);
        }
    }

    /// Whether the transport holds a link handle.
    pub fn is_link_open(&self) -> bool {
        self.link_open
    }

    /// Characteristics resolved for the current link.
    pub fn characteristics(&self) -> &ResolvedCharacteristics {
        &self.characteristics
    }

    /// Handle for a role on the current link.
    pub fn handle(&self, role: CharacteristicRole) -> Option<CharacteristicHandle> {
        self.characteristics.handle(role)
    }

    /// Role a handle belongs to on the current link.
    pub fn role_for(&self, handle: CharacteristicHandle) -> Option<CharacteristicRole> {
        self.characteristics.role_for(handle)
    }

    /// Update the connection state.
    pub fn set_state(&mut self, new_state: ConnectionState) {
        let old_state = self.state;
        self.state = new_state;

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);
        }
    }

    /// Record that the transport opened the link.
    pub fn link_established(&mut self) {
        self.link_open = true;
    }

    /// Apply a discovery result.
    ///
    /// On success the characteristics and the peripheral address are stored
    /// and `true` is returned. An incomplete profile leaves nothing resolved.
    pub fn apply_discovery(
        &mut self,
        peripheral: PeripheralAddress,
        services: &DiscoveredServices,
    ) -> bool {
        match ResolvedCharacteristics::resolve(services) {
            Ok(characteristics) => {
                info!(
                    "Resolved {} characteristics on {}",
                    characteristics.len(),
                    peripheral
                );
                self.characteristics = characteristics;
                self.peripheral = Some(peripheral);
                true
            }
            Err(missing) => {
                warn!(
                    "Incomplete sensor profile on {}, missing: {:?}",
                    peripheral, missing
                );
                self.characteristics.clear();
                false
            }
        }
    }

    /// Drop everything tied to the current link attempt.
    ///
    /// The link handle survives a remote disconnect so it can be reused by a
    /// later reconnect; `release_link` drops it.
    pub fn reset(&mut self) {
        self.characteristics.clear();
        self.set_state(ConnectionState::Idle);
    }

    /// Forget the link handle after the transport closed it.
    pub fn release_link(&mut self) {
        self.link_open = false;
    }
}
