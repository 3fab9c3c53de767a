//! # Link Protocol Constants
//!
//! Core definitions for the frame formats understood by the microcontroller.
//!
//! Configuration frame layout:
//!
//! ```text
//! "CF" (2 bytes) | fragment count (1 byte) | per enabled channel:
//!     parameter count (1 byte) | byte width (1 byte)
//! ```
//!
//! Data fragment layout:
//!
//! ```text
//! sequence index (1 byte) | up to 19 payload bytes
//! ```

/// Hard cap on one link transmission (ATT-style MTU)
pub const LINK_MTU: usize = 20;

/// Data bytes that fit in one fragment after the sequence header
pub const FRAGMENT_DATA_MAX: usize = LINK_MTU - 1;

/// Maximum size of the configuration frame
///
/// 2 marker bytes + 1 fragment count byte + 2 bytes per enabled channel,
/// which bounds how many channels can be enabled at once.
pub const CONFIG_FRAME_MAX_LEN: usize = 18;

/// Marker prefix identifying the configuration frame
pub const CONFIG_FRAME_MARKER: &[u8; 2] = b"CF";

/// Acknowledgement token the peer sends after accepting the configuration
pub const CONFIG_ACK_TOKEN: &[u8] = b"OK_CF";

/// Largest fragment count expressible in the configuration frame
pub const MAX_FRAGMENTS: usize = 255;

/// Encoding widths the quantizer supports, in bytes per parameter
pub const SUPPORTED_BYTE_WIDTHS: [u8; 3] = [1, 2, 4];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(LINK_MTU, 20);
        assert_eq!(FRAGMENT_DATA_MAX, 19);
        assert_eq!(CONFIG_FRAME_MAX_LEN, 18);
        assert_eq!(CONFIG_FRAME_MARKER, b"CF");
        assert_eq!(CONFIG_ACK_TOKEN, b"OK_CF");
    }

    #[test]
    fn test_config_frame_bounds_channel_count() {
        // 2 marker bytes + 1 count byte leaves room for 8 channel descriptors
        let max_channels = (CONFIG_FRAME_MAX_LEN - 3) / 2;
        assert_eq!(max_channels, 7, "15 bytes hold 7 full descriptors");

        // A frame with 8 descriptors needs 19 bytes and must be rejected
        assert!(3 + 8 * 2 > CONFIG_FRAME_MAX_LEN);
    }
}
