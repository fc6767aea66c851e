//! The fixed Celsian sensor profile.
//!
//! Maps each semantic sensor channel to its characteristic UUID and tracks
//! which transport handle each channel resolved to during discovery.

use std::collections::HashMap;
use uuid::Uuid;

use crate::ble::transport::{CharacteristicHandle, DiscoveredServices};
use crate::ble::uuids::*;

/// A semantic sensor channel exposed by the Celsian service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CharacteristicRole {
    /// Temperature from the MPL3115 barometer (°C).
    MplTemperature,
    /// Temperature from the SHT humidity sensor (°C).
    ShtTemperature,
    /// Relative humidity (percent).
    RelativeHumidity,
    /// Barometric pressure (pascals).
    Pressure,
    /// Raw UVA channel count.
    Uva,
    /// Raw UVB channel count.
    Uvb,
    /// Raw UV dummy channel count.
    UvDummy,
    /// Raw UV compensation channel 1 count.
    UvComp1,
    /// Raw UV compensation channel 2 count.
    UvComp2,
}

impl CharacteristicRole {
    /// Every role in the profile, in characteristic UUID order.
    pub const ALL: [CharacteristicRole; 9] = [
        Self::MplTemperature,
        Self::ShtTemperature,
        Self::RelativeHumidity,
        Self::Pressure,
        Self::Uva,
        Self::Uvb,
        Self::UvDummy,
        Self::UvComp1,
        Self::UvComp2,
    ];

    /// The characteristic UUID this role is read from.
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::MplTemperature => MPL_TEMPERATURE_UUID,
            Self::ShtTemperature => SHT_TEMPERATURE_UUID,
            Self::RelativeHumidity => RELATIVE_HUMIDITY_UUID,
            Self::Pressure => PRESSURE_UUID,
            Self::Uva => UVA_UUID,
            Self::Uvb => UVB_UUID,
            Self::UvDummy => UV_DUMMY_UUID,
            Self::UvComp1 => UV_COMP1_UUID,
            Self::UvComp2 => UV_COMP2_UUID,
        }
    }

    /// Look up the role for a characteristic UUID.
    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.uuid() == *uuid)
    }

    /// Whether this role carries a temperature encoded as a double.
    pub fn is_temperature(&self) -> bool {
        matches!(self, Self::MplTemperature | Self::ShtTemperature)
    }

    /// Whether this role is one of the five UV channels.
    pub fn is_uv(&self) -> bool {
        matches!(
            self,
            Self::Uva | Self::Uvb | Self::UvDummy | Self::UvComp1 | Self::UvComp2
        )
    }

    /// Number of payload bytes needed to decode a value for this role.
    pub fn payload_len(&self) -> usize {
        if self.is_temperature() {
            8
        } else {
            2
        }
    }
}

impl std::fmt::Display for CharacteristicRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MplTemperature => write!(f, "MPL temperature"),
            Self::ShtTemperature => write!(f, "SHT temperature"),
            Self::RelativeHumidity => write!(f, "relative humidity"),
            Self::Pressure => write!(f, "pressure"),
            Self::Uva => write!(f, "UVA"),
            Self::Uvb => write!(f, "UVB"),
            Self::UvDummy => write!(f, "UV dummy"),
            Self::UvComp1 => write!(f, "UV comp1"),
            Self::UvComp2 => write!(f, "UV comp2"),
        }
    }
}

/// Role to transport handle mapping built during service discovery.
///
/// The mapping is either empty or holds exactly one handle per role. A
/// discovery that misses any role leaves it empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCharacteristics {
    handles: HashMap<CharacteristicRole, CharacteristicHandle>,
}

impl ResolvedCharacteristics {
    /// Resolve every role against a discovery result.
    ///
    /// Returns `Err` with the roles that could not be found when the profile
    /// is incomplete.
    pub fn resolve(
        services: &DiscoveredServices,
    ) -> std::result::Result<Self, Vec<CharacteristicRole>> {
        let mut handles = HashMap::with_capacity(CharacteristicRole::ALL.len());
        let mut missing = Vec::new();

        for role in CharacteristicRole::ALL {
            match services.resolve(&CELSIAN_SERVICE_UUID, &role.uuid()) {
                Some(handle) => {
                    handles.insert(role, handle);
                }
                None => missing.push(role),
            }
        }

        if missing.is_empty() {
            Ok(Self { handles })
        } else {
            Err(missing)
        }
    }

    /// Handle for a role, if resolved.
    pub fn handle(&self, role: CharacteristicRole) -> Option<CharacteristicHandle> {
        self.handles.get(&role).copied()
    }

    /// Role a handle was resolved for.
    pub fn role_for(&self, handle: CharacteristicHandle) -> Option<CharacteristicRole> {
        self.handles
            .iter()
            .find(|(_, h)| **h == handle)
            .map(|(role, _)| *role)
    }

    /// Check if nothing is resolved.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of resolved roles (0 or 9).
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Drop every resolved handle.
    pub fn clear(&mut self) {
        self.handles.clear();
    }
}
