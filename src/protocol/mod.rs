//! Protocol module for decoding characteristic payloads.

pub mod decode;

pub use decode::decode_value;
