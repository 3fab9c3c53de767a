//! # Error Types
//!
//! Custom error types for Sensor Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Sensor Bridge
#[derive(Debug, Error)]
pub enum SensorBridgeError {
    /// Quantization was requested with an unsupported encoding width
    #[error("invalid byte width: {0} (must be 1, 2 or 4)")]
    InvalidByteWidth(u8),

    /// The configuration frame would exceed the 18-byte cap
    #[error("configuration frame is {0} bytes, maximum is 18")]
    ConfigurationFrameTooLarge(usize),

    /// A sample was written with the wrong number of parameters
    #[error("channel {channel} expects {expected} parameters, got {got}")]
    ChannelArityMismatch {
        channel: &'static str,
        expected: usize,
        got: usize,
    },

    /// The enabled payload needs more fragments than a single count byte holds
    #[error("data cycle needs {0} fragments, maximum is 255")]
    PayloadTooLarge(usize),

    /// Fragmentation produced a different byte count than precalculated
    #[error("fragmentation produced {actual} bytes, expected {expected}")]
    FragmentationInvariantViolated { expected: usize, actual: usize },

    /// The watchdog elapsed without any inbound activity from the peer
    #[error("communication error: peer stopped responding")]
    CommunicationError,

    /// A frame larger than the link MTU was handed to the link
    #[error("frame is {0} bytes, link MTU is 20")]
    FrameExceedsMtu(usize),

    /// Link I/O errors
    #[error("link error: {0}")]
    Link(String),

    /// No usable link device was found
    #[error("no link device found at: {0}")]
    LinkPortNotFound(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration encoding errors
    #[error("configuration error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Sensor Bridge
pub type Result<T> = std::result::Result<T, SensorBridgeError>;
