//! # Quantization Codec
//!
//! Scales real-valued sensor readings into fixed-width signed integers and
//! encodes them as little-endian byte strings for transmission.
//!
//! A reading is mapped onto the full signed range of the channel's encoding
//! width, using the channel's clamp bound as the assumed maximum magnitude.
//! Readings beyond the bound saturate at full scale instead of wrapping.

use bytes::Bytes;

use crate::error::{Result, SensorBridgeError};

/// Full-scale value for a given encoding width (`2^(8w-1) - 1`)
///
/// # Errors
///
/// Returns `InvalidByteWidth` for widths outside {1, 2, 4}
pub fn full_scale(byte_width: u8) -> Result<i64> {
    match byte_width {
        1 => Ok(i8::MAX as i64),
        2 => Ok(i16::MAX as i64),
        4 => Ok(i32::MAX as i64),
        other => Err(SensorBridgeError::InvalidByteWidth(other)),
    }
}

/// Scale a reading to the full signed range of `byte_width` bytes
///
/// Values within `[-clamp_max, clamp_max]` are scaled proportionally and
/// truncated towards zero; values outside saturate at positive or negative
/// full scale regardless of magnitude.
///
/// # Arguments
///
/// * `value` - Raw reading from the sensor
/// * `clamp_max` - Assumed maximum magnitude of the reading (must be positive)
/// * `byte_width` - Encoding width in bytes (1, 2 or 4)
///
/// # Errors
///
/// Returns `InvalidByteWidth` for widths outside {1, 2, 4}
///
/// # Examples
///
/// ```
/// use sensor_bridge::wire::quant::scale;
///
/// assert_eq!(scale(3.0, 3.0, 2).unwrap(), 32767);
/// assert_eq!(scale(-3.0, 3.0, 2).unwrap(), -32767);
/// assert_eq!(scale(100.0, 3.0, 2).unwrap(), 32767); // saturates
/// ```
pub fn scale(value: f64, clamp_max: f64, byte_width: u8) -> Result<i64> {
    let full = full_scale(byte_width)? as f64;

    let scaled = if value.abs() <= clamp_max {
        (value / clamp_max) * full
    } else if value > clamp_max {
        full
    } else {
        -full
    };

    Ok(scaled.trunc() as i64)
}

/// Encode a scaled value as exactly `byte_width` little-endian bytes
///
/// `scaled` must fit the signed range of the width, which `scale` guarantees
/// for its own output.
///
/// # Errors
///
/// Returns `InvalidByteWidth` for widths outside {1, 2, 4}
pub fn encode(scaled: i64, byte_width: u8) -> Result<Bytes> {
    match byte_width {
        1 => Ok(Bytes::copy_from_slice(&(scaled as i8).to_le_bytes())),
        2 => Ok(Bytes::copy_from_slice(&(scaled as i16).to_le_bytes())),
        4 => Ok(Bytes::copy_from_slice(&(scaled as i32).to_le_bytes())),
        other => Err(SensorBridgeError::InvalidByteWidth(other)),
    }
}
