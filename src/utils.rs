//! Display conversions for sensor values.
//!
//! The sensor reports temperatures in degrees Celsius and pressure in
//! pascals; these helpers convert them to the units shown to users.

/// Convert a temperature reading from Celsius to Fahrenheit.
///
/// # Example
///
/// ```
/// use celsian_ble::celsius_to_fahrenheit;
///
/// // A 21 °C room reading.
/// assert!((celsius_to_fahrenheit(21.0) - 69.8).abs() < 0.001);
/// ```
#[inline]
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Convert a pressure reading from pascals to millibars.
///
/// # Example
///
/// ```
/// use celsian_ble::pascals_to_millibars;
///
/// assert!((pascals_to_millibars(101_325.0) - 1013.25).abs() < 0.001);
/// ```
#[inline]
pub fn pascals_to_millibars(pascals: f64) -> f64 {
    pascals / 100.0
}
