//! Data structures for sensor values.

pub mod readings;

pub use readings::{Reading, SensorReadings, SensorValue};
