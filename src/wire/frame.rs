//! # Frame Builder
//!
//! Assembles the configuration frame and fragments the per-cycle data
//! payload into link-sized frames.
//!
//! Every frame handed to the link is at most 20 bytes. A data cycle
//! concatenates the encoded values of all enabled channels, splits the
//! result into chunks of at most 19 bytes and prefixes each chunk with a
//! 1-byte sequence index. The expected byte count of a cycle is
//! precalculated from the configuration; a mismatch with what fragmentation
//! actually produced means the configuration and the registry diverged and
//! is treated as a fatal fault.

use bytes::{BufMut, Bytes, BytesMut};

use super::protocol::{
    CONFIG_FRAME_MARKER, CONFIG_FRAME_MAX_LEN, FRAGMENT_DATA_MAX, LINK_MTU,
};
use crate::config::SessionConfig;
use crate::error::{Result, SensorBridgeError};
use crate::registry::ChannelRegistry;

/// Payload bytes of one data cycle: parameters times width, summed over the
/// enabled channels
pub fn calculate_payload_length(config: &SessionConfig) -> usize {
    config
        .channel_settings()
        .iter()
        .filter(|s| s.enabled)
        .map(|s| s.parameter_count as usize * s.byte_width as usize)
        .sum()
}

/// Sequence headers needed to carry `payload_len` bytes
///
/// An empty payload still takes one header: every cycle round-trips at
/// least one frame.
fn header_count(payload_len: usize) -> usize {
    if payload_len == 0 {
        1
    } else {
        payload_len.div_ceil(FRAGMENT_DATA_MAX)
    }
}

/// Total bytes one data cycle puts on the wire, headers included
pub fn calculate_expected_length(config: &SessionConfig) -> usize {
    let payload = calculate_payload_length(config);
    payload + header_count(payload)
}

/// Number of fragments one data cycle needs at the current configuration
///
/// This is the value announced to the peer in the configuration frame. The
/// expected cycle length is never zero, so the count is always at least 1.
pub fn calculate_fragment_count(config: &SessionConfig) -> usize {
    calculate_expected_length(config).div_ceil(LINK_MTU)
}

/// Build the configuration frame
///
/// Layout: `"CF"`, one fragment count byte, then one
/// (parameter count, byte width) pair per enabled channel in transmission
/// order.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the fragment count does not fit its single
/// byte, or `ConfigurationFrameTooLarge` if the frame would exceed 18 bytes.
/// Both are configuration mistakes that must surface before transmission
/// starts.
pub fn build_configuration_frame(config: &SessionConfig) -> Result<Bytes> {
    let fragments = calculate_fragment_count(config);
    let fragments =
        u8::try_from(fragments).map_err(|_| SensorBridgeError::PayloadTooLarge(fragments))?;

    let mut frame = BytesMut::with_capacity(CONFIG_FRAME_MAX_LEN);
    frame.put_slice(CONFIG_FRAME_MARKER);
    frame.put_u8(fragments);

    for settings in config.channel_settings().iter().filter(|s| s.enabled) {
        frame.put_u8(settings.parameter_count);
        frame.put_u8(settings.byte_width);
    }

    if frame.len() > CONFIG_FRAME_MAX_LEN {
        return Err(SensorBridgeError::ConfigurationFrameTooLarge(frame.len()));
    }

    Ok(frame.freeze())
}

/// Concatenate the encoded values of every enabled channel in transmission
/// order
pub fn build_data_payload(registry: &ChannelRegistry) -> Bytes {
    let mut payload = BytesMut::new();

    for channel in registry.enabled_channels() {
        for encoded in channel.encoded_values() {
            payload.put_slice(encoded);
        }
    }

    payload.freeze()
}

/// Split a payload into numbered fragments of at most 20 bytes each
///
/// Each fragment is a 1-byte zero-based sequence index followed by up to 19
/// payload bytes. The index wraps at 256; configuration validation keeps
/// real cycles at 255 fragments or fewer. An empty payload yields exactly
/// one header-only fragment.
pub fn fragment(payload: &[u8]) -> Vec<Bytes> {
    let mut frames = Vec::with_capacity(header_count(payload.len()));
    let mut index = 0usize;

    loop {
        let start = index * FRAGMENT_DATA_MAX;
        let end = usize::min(start + FRAGMENT_DATA_MAX, payload.len());

        let mut frame = BytesMut::with_capacity(1 + end - start);
        frame.put_u8((index % 256) as u8);
        frame.put_slice(&payload[start..end]);
        frames.push(frame.freeze());

        index += 1;
        if payload.len() <= index * FRAGMENT_DATA_MAX {
            break;
        }
    }

    frames
}

/// Build one full data cycle from the registry and verify its size
///
/// # Errors
///
/// Returns `FragmentationInvariantViolated` if the produced frames do not
/// add up to the byte count precalculated from the configuration. That
/// means the registry contents and the announced configuration diverged,
/// which is a bug rather than a transient condition.
pub fn build_cycle_frames(
    registry: &ChannelRegistry,
    config: &SessionConfig,
) -> Result<Vec<Bytes>> {
    let payload = build_data_payload(registry);
    let frames = fragment(&payload);

    let actual: usize = frames.iter().map(|f| f.len()).sum();
    let expected = calculate_expected_length(config);
    if actual != expected {
        return Err(SensorBridgeError::FragmentationInvariantViolated { expected, actual });
    }

    Ok(frames)
}
