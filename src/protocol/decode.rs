//! Characteristic payload decoding.
//!
//! Temperature characteristics carry a little-endian IEEE-754 double in
//! degrees Celsius. Every other characteristic carries a little-endian
//! unsigned 16-bit integer. Values are read from the start of the payload;
//! trailing bytes are ignored.

use bytes::Buf;

use crate::ble::profile::CharacteristicRole;
use crate::data::SensorValue;
use crate::error::{Error, Result};

/// Decode a raw characteristic payload for the given role.
///
/// # Errors
///
/// Returns [`Error::InvalidPayload`] if the payload is shorter than the
/// role's encoding.
///
/// # Example
///
/// ```
/// use celsian_ble::ble::CharacteristicRole;
/// use celsian_ble::data::SensorValue;
/// use celsian_ble::protocol::decode_value;
///
/// let value = decode_value(CharacteristicRole::Uva, &[0xE8, 0x03]).unwrap();
/// assert_eq!(value, SensorValue::Raw(1000));
/// ```
pub fn decode_value(role: CharacteristicRole, payload: &[u8]) -> Result<SensorValue> {
    let expected = role.payload_len();
    if payload.len() < expected {
        return Err(Error::InvalidPayload {
            role,
            expected,
            actual: payload.len(),
        });
    }

    let mut buf = payload;
    let value = if role.is_temperature() {
        SensorValue::Temperature(buf.get_f64_le())
    } else {
        SensorValue::Raw(buf.get_u16_le())
    };

    Ok(value)
}
