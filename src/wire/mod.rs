//! # Wire Format Module
//!
//! Byte-level formats exchanged with the microcontroller over the BLE link.
//!
//! This module handles:
//! - Quantization of real-valued sensor readings into fixed-width integers
//! - Configuration frame assembly
//! - Fragmentation of the per-cycle data payload into link-sized frames
//! - Frame size and fragment count precalculation

pub mod frame;
pub mod protocol;
pub mod quant;
