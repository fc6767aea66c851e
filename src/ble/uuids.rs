//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants of the Celsian sensor profile.

use std::time::Duration;
use uuid::Uuid;

use crate::ble::transport::ServiceFilter;

// Celsian Sensor Service (custom)
/// Celsian sensor service UUID.
pub const CELSIAN_SERVICE_UUID: Uuid = Uuid::from_u128(0x2d04_0001_779e_4efa_9e1b_351935c016dc);
/// Scan filter mask for the service UUID. Every bit is significant.
pub const CELSIAN_SERVICE_UUID_MASK: Uuid =
    Uuid::from_u128(0xffff_ffff_ffff_ffff_ffff_ffffffffffff);

/// MPL3115 temperature characteristic UUID (Read).
pub const MPL_TEMPERATURE_UUID: Uuid = Uuid::from_u128(0x2d04_0002_779e_4efa_9e1b_351935c016dc);
/// SHT temperature characteristic UUID (Read).
pub const SHT_TEMPERATURE_UUID: Uuid = Uuid::from_u128(0x2d04_0003_779e_4efa_9e1b_351935c016dc);
/// Relative humidity characteristic UUID (Read).
pub const RELATIVE_HUMIDITY_UUID: Uuid =
    Uuid::from_u128(0x2d04_0004_779e_4efa_9e1b_351935c016dc);
/// Barometric pressure characteristic UUID (Read).
pub const PRESSURE_UUID: Uuid = Uuid::from_u128(0x2d04_0005_779e_4efa_9e1b_351935c016dc);
/// UVA irradiance characteristic UUID (Read).
pub const UVA_UUID: Uuid = Uuid::from_u128(0x2d04_0006_779e_4efa_9e1b_351935c016dc);
/// UVB irradiance characteristic UUID (Read).
pub const UVB_UUID: Uuid = Uuid::from_u128(0x2d04_0007_779e_4efa_9e1b_351935c016dc);
/// UV dummy channel characteristic UUID (Read).
pub const UV_DUMMY_UUID: Uuid = Uuid::from_u128(0x2d04_0008_779e_4efa_9e1b_351935c016dc);
/// UV compensation channel 1 characteristic UUID (Read).
pub const UV_COMP1_UUID: Uuid = Uuid::from_u128(0x2d04_0009_779e_4efa_9e1b_351935c016dc);
/// UV compensation channel 2 characteristic UUID (Read).
pub const UV_COMP2_UUID: Uuid = Uuid::from_u128(0x2d04_000a_779e_4efa_9e1b_351935c016dc);

/// How long a scan runs before giving up on finding the sensor.
pub const SCAN_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Scan filter for the Celsian service.
pub const CELSIAN_SERVICE_FILTER: ServiceFilter = ServiceFilter {
    uuid: CELSIAN_SERVICE_UUID,
    mask: CELSIAN_SERVICE_UUID_MASK,
};

/// Check whether `uuid` matches the Celsian service under the profile mask.
pub fn is_celsian_service(uuid: &Uuid) -> bool {
    CELSIAN_SERVICE_FILTER.matches(uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            CELSIAN_SERVICE_UUID.to_string(),
            "2d040001-779e-4efa-9e1b-351935c016dc"
        );
        assert_eq!(
            UV_COMP2_UUID.to_string(),
            "2d04000a-779e-4efa-9e1b-351935c016dc"
        );
        assert_eq!(CELSIAN_SERVICE_UUID_MASK.as_u128(), u128::MAX);
    }

    #[test]
    fn test_is_celsian_service() {
        assert!(is_celsian_service(&CELSIAN_SERVICE_UUID));
        // Characteristic UUIDs share the base but differ in the short id.
        assert!(!is_celsian_service(&MPL_TEMPERATURE_UUID));
        assert!(!is_celsian_service(&Uuid::nil()));
    }

    #[test]
    fn test_scan_timeout() {
        assert_eq!(SCAN_TIMEOUT.as_millis(), 10_000);
    }
}
