//! # Sensor Bridge Library
//!
//! Stream quantized phone sensor readings to a microcontroller over a BLE
//! UART link.
//!
//! This library provides the transport core for the bridge: quantization of
//! sensor samples, fragmentation of each cycle into 20-byte link frames,
//! and the transmission state machine with its watchdog and connection
//! health estimation.

pub mod config;
pub mod error;
pub mod link;
pub mod registry;
pub mod sensors;
pub mod session;
pub mod wire;
