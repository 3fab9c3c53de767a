//! # Configuration Module
//!
//! Persisted session configuration: the target baudrate and the transmission
//! settings of each sensor channel, stored as a small versioned TOML document.
//!
//! Loading is all-or-nothing. A missing file yields the defaults; a file that
//! is unreadable, fails to parse, carries the wrong version or fails
//! validation is deleted and replaced with the defaults. No attempt is made
//! to salvage individual fields from a damaged store.

use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{Result, SensorBridgeError};
use crate::wire::frame;
use crate::wire::protocol::{CONFIG_FRAME_MAX_LEN, MAX_FRAGMENTS, SUPPORTED_BYTE_WIDTHS};

/// Version tag written into every stored configuration
pub const CONFIG_VERSION: u32 = 1;

/// Transmission contract of one sensor channel
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelSettings {
    /// Whether this channel contributes to frames this session
    pub enabled: bool,

    /// Number of scalar values per sample
    pub parameter_count: u8,

    /// Encoding width per parameter in bytes (1, 2 or 4)
    pub byte_width: u8,

    /// Assumed maximum magnitude of a reading; values beyond it saturate
    pub clamp_max: f64,
}

/// Session configuration: baudrate plus the fixed set of channels
///
/// The channel order here is the transmission order on the wire:
/// accelerometer, then location, then gyroscope.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionConfig {
    /// Storage schema version, must equal [`CONFIG_VERSION`]
    pub version: u32,

    /// Target frames per second
    pub baudrate: u32,

    pub accelerometer: ChannelSettings,
    pub location: ChannelSettings,
    pub gyroscope: ChannelSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            baudrate: 1,
            accelerometer: ChannelSettings {
                enabled: true,
                parameter_count: 3,
                byte_width: 2,
                clamp_max: 3.0,
            },
            location: ChannelSettings {
                enabled: true,
                parameter_count: 3,
                byte_width: 2,
                clamp_max: 100.0,
            },
            gyroscope: ChannelSettings {
                enabled: true,
                parameter_count: 3,
                byte_width: 2,
                clamp_max: 6.28,
            },
        }
    }
}

impl SessionConfig {
    /// Channel settings in fixed transmission order
    pub fn channel_settings(&self) -> [&ChannelSettings; 3] {
        [&self.accelerometer, &self.location, &self.gyroscope]
    }

    /// Number of channels contributing to frames
    pub fn enabled_channel_count(&self) -> usize {
        self.channel_settings().iter().filter(|s| s.enabled).count()
    }

    /// Load a configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - The stored version does not match [`CONFIG_VERSION`]
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&contents)?;

        if config.version != CONFIG_VERSION {
            return Err(SensorBridgeError::Config(toml::de::Error::custom(format!(
                "unsupported configuration version {} (expected {})",
                config.version, CONFIG_VERSION
            ))));
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a configuration, falling back to defaults on any failure
    ///
    /// A missing file is the normal first-run case and simply yields the
    /// defaults. Any other failure is logged, the damaged file is deleted and
    /// the defaults are returned.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("no stored configuration at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "stored configuration at {} is unusable ({}), clearing it and using defaults",
                    path.display(),
                    e
                );
                if let Err(e) = fs::remove_file(path) {
                    warn!("failed to clear stored configuration: {}", e);
                }
                Self::default()
            }
        }
    }

    /// Save the configuration as versioned TOML
    ///
    /// # Errors
    ///
    /// Returns error if the configuration fails validation, cannot be
    /// serialized or cannot be written
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of range, if the configuration frame
    /// would exceed its size cap, or if a data cycle would need more
    /// fragments than the count byte can express
    pub fn validate(&self) -> Result<()> {
        if self.baudrate == 0 {
            return Err(SensorBridgeError::Config(toml::de::Error::custom(
                "baudrate must be greater than 0",
            )));
        }

        for (name, settings) in [
            ("accelerometer", &self.accelerometer),
            ("location", &self.location),
            ("gyroscope", &self.gyroscope),
        ] {
            if !SUPPORTED_BYTE_WIDTHS.contains(&settings.byte_width) {
                return Err(SensorBridgeError::InvalidByteWidth(settings.byte_width));
            }

            if settings.parameter_count == 0 {
                return Err(SensorBridgeError::Config(toml::de::Error::custom(format!(
                    "{} parameter_count must be greater than 0",
                    name
                ))));
            }

            if !(settings.clamp_max.is_finite() && settings.clamp_max > 0.0) {
                return Err(SensorBridgeError::Config(toml::de::Error::custom(format!(
                    "{} clamp_max must be a positive finite number",
                    name
                ))));
            }
        }

        let config_frame_len = 3 + 2 * self.enabled_channel_count();
        if config_frame_len > CONFIG_FRAME_MAX_LEN {
            return Err(SensorBridgeError::ConfigurationFrameTooLarge(config_frame_len));
        }

        let fragments = frame::calculate_fragment_count(self);
        if fragments > MAX_FRAGMENTS {
            return Err(SensorBridgeError::PayloadTooLarge(fragments));
        }

        Ok(())
    }
}
