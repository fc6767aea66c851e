//! Last-known sensor readings.
//!
//! Holds the most recent decoded value for each characteristic role along
//! with a few values derived from them.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::ble::profile::CharacteristicRole;

// VEML6075 UV index coefficients (Vishay application note, open air).
const VEML_A_COEF: f64 = 3.33;
const VEML_B_COEF: f64 = 2.5;
const VEML_C_COEF: f64 = 3.66;
const VEML_D_COEF: f64 = 2.75;
const VEML_UVA_RESPONSIVITY: f64 = 0.0011;
const VEML_UVB_RESPONSIVITY: f64 = 0.00125;

/// A decoded characteristic value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorValue {
    /// Temperature in degrees Celsius.
    Temperature(f64),
    /// Unsigned 16-bit reading. Units depend on the role: percent for
    /// relative humidity, pascals for pressure, raw counts for UV channels.
    Raw(u16),
}

impl SensorValue {
    /// The value as a float regardless of encoding.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Temperature(celsius) => *celsius,
            Self::Raw(raw) => f64::from(*raw),
        }
    }

    /// The temperature, if this is a temperature value.
    pub fn as_temperature(&self) -> Option<f64> {
        match self {
            Self::Temperature(celsius) => Some(*celsius),
            Self::Raw(_) => None,
        }
    }

    /// The raw integer, if this is an integer value.
    pub fn as_raw(&self) -> Option<u16> {
        match self {
            Self::Temperature(_) => None,
            Self::Raw(raw) => Some(*raw),
        }
    }
}

impl std::fmt::Display for SensorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temperature(celsius) => write!(f, "{:.2}°C", celsius),
            Self::Raw(raw) => write!(f, "{}", raw),
        }
    }
}

/// A value together with the time it was decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    /// The decoded value.
    pub value: SensorValue,
    /// When the value was received.
    pub updated_at: DateTime<Utc>,
}

/// Most recent reading for each role. A missing role is unknown.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorReadings {
    readings: HashMap<CharacteristicRole, Reading>,
}

impl SensorReadings {
    /// Create an empty set of readings (everything unknown).
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new value for a role.
    pub fn update(&mut self, role: CharacteristicRole, value: SensorValue) {
        self.readings.insert(
            role,
            Reading {
                value,
                updated_at: Utc::now(),
            },
        );
    }

    /// Get the reading for a role.
    pub fn get(&self, role: CharacteristicRole) -> Option<&Reading> {
        self.readings.get(&role)
    }

    /// Get the value for a role.
    pub fn value(&self, role: CharacteristicRole) -> Option<SensorValue> {
        self.readings.get(&role).map(|r| r.value)
    }

    /// Get a temperature role in degrees Celsius.
    pub fn temperature(&self, role: CharacteristicRole) -> Option<f64> {
        self.value(role).and_then(|v| v.as_temperature())
    }

    /// Get an integer role.
    pub fn raw(&self, role: CharacteristicRole) -> Option<u16> {
        self.value(role).and_then(|v| v.as_raw())
    }

    /// Relative humidity in percent.
    pub fn relative_humidity(&self) -> Option<u16> {
        self.raw(CharacteristicRole::RelativeHumidity)
    }

    /// Barometric pressure in pascals.
    pub fn pressure(&self) -> Option<u16> {
        self.raw(CharacteristicRole::Pressure)
    }

    /// Mean of the two temperature sensors, when both are known.
    pub fn average_temperature(&self) -> Option<f64> {
        let mpl = self.temperature(CharacteristicRole::MplTemperature)?;
        let sht = self.temperature(CharacteristicRole::ShtTemperature)?;
        Some((mpl + sht) / 2.0)
    }

    /// UV index computed from the five UV channels, when all are known.
    ///
    /// Subtracts the dummy channel and compensates the UVA/UVB counts for
    /// visible and infrared leakage before applying the channel responsivity.
    pub fn uv_index(&self) -> Option<f64> {
        let uva = f64::from(self.raw(CharacteristicRole::Uva)?);
        let uvb = f64::from(self.raw(CharacteristicRole::Uvb)?);
        let dummy = f64::from(self.raw(CharacteristicRole::UvDummy)?);
        let comp1 = f64::from(self.raw(CharacteristicRole::UvComp1)?);
        let comp2 = f64::from(self.raw(CharacteristicRole::UvComp2)?);

        let uva_comp =
            (uva - dummy) - VEML_A_COEF * (comp1 - dummy) - VEML_B_COEF * (comp2 - dummy);
        let uvb_comp =
            (uvb - dummy) - VEML_C_COEF * (comp1 - dummy) - VEML_D_COEF * (comp2 - dummy);

        Some((uvb_comp * VEML_UVB_RESPONSIVITY + uva_comp * VEML_UVA_RESPONSIVITY) / 2.0)
    }

    /// Check if every role has a value.
    pub fn is_complete(&self) -> bool {
        CharacteristicRole::ALL
            .iter()
            .all(|role| self.readings.contains_key(role))
    }

    /// Number of known roles.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Check if nothing is known.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Mark every role unknown.
    pub fn clear(&mut self) {
        self.readings.clear();
    }
}
