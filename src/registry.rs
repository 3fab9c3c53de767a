//! # Sensor Channel Registry
//!
//! Latest-value slots for the configured sensor channels.
//!
//! Each channel holds exactly one sample at a time, kept in three lock-step
//! views: the raw readings, their quantized integers and their encoded byte
//! strings. Writing a sample updates all three views in one step, so the
//! payload builder always reads a consistent snapshot. Sensor pollers are
//! the only writers; the transport session is the only reader.

use bytes::Bytes;

use crate::config::{ChannelSettings, SessionConfig};
use crate::error::{Result, SensorBridgeError};
use crate::wire::quant;

/// Identity of a sensor channel, fixed for the life of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Accelerometer,
    Location,
    Gyroscope,
}

impl ChannelId {
    /// All channels in transmission order
    pub const ALL: [ChannelId; 3] = [
        ChannelId::Accelerometer,
        ChannelId::Location,
        ChannelId::Gyroscope,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ChannelId::Accelerometer => "accelerometer",
            ChannelId::Location => "location",
            ChannelId::Gyroscope => "gyroscope",
        }
    }

    /// Position of this channel in transmission order
    fn index(&self) -> usize {
        match self {
            ChannelId::Accelerometer => 0,
            ChannelId::Location => 1,
            ChannelId::Gyroscope => 2,
        }
    }
}

/// One sensor channel: its transmission contract plus the latest sample
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub enabled: bool,
    pub parameter_count: u8,
    pub byte_width: u8,
    pub clamp_max: f64,
    raw_values: Vec<f64>,
    quantized_values: Vec<i64>,
    encoded_values: Vec<Bytes>,
}

impl Channel {
    fn new(id: ChannelId, settings: &ChannelSettings) -> Result<Self> {
        let count = settings.parameter_count as usize;
        let zero = quant::encode(0, settings.byte_width)?;

        Ok(Self {
            id,
            enabled: settings.enabled,
            parameter_count: settings.parameter_count,
            byte_width: settings.byte_width,
            clamp_max: settings.clamp_max,
            raw_values: vec![0.0; count],
            quantized_values: vec![0; count],
            encoded_values: vec![zero; count],
        })
    }

    /// Latest raw readings
    pub fn raw_values(&self) -> &[f64] {
        &self.raw_values
    }

    /// Latest quantized readings
    pub fn quantized_values(&self) -> &[i64] {
        &self.quantized_values
    }

    /// Latest encoded readings, one byte string per parameter
    pub fn encoded_values(&self) -> &[Bytes] {
        &self.encoded_values
    }
}

/// The set of configured channels in fixed transmission order
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    /// Build the registry from a session configuration
    ///
    /// Every channel starts with an all-zero sample, so a payload built
    /// before the first sensor callback already has its configured length.
    ///
    /// # Errors
    ///
    /// Returns `InvalidByteWidth` if a channel is configured with an
    /// unsupported encoding width
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let channels = ChannelId::ALL
            .iter()
            .zip(config.channel_settings())
            .map(|(&id, settings)| Channel::new(id, settings))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { channels })
    }

    /// All channels in transmission order
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Channels contributing to frames this session, in transmission order
    pub fn enabled_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| c.enabled)
    }

    /// Look up one channel
    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    /// Store a sample, quantizing every parameter against the channel's
    /// clamp bound
    ///
    /// Overwrites the previous sample; only the most recent sample is ever
    /// transmitted.
    ///
    /// # Errors
    ///
    /// Returns `ChannelArityMismatch` if `values` does not match the
    /// channel's parameter count
    pub fn set_sample(&mut self, id: ChannelId, values: &[f64]) -> Result<()> {
        self.store(id, values, None)
    }

    /// Store a sample with an explicit clamp bound per parameter
    ///
    /// Used by channels whose parameters cover different ranges, such as
    /// latitude and longitude on the location channel.
    ///
    /// # Errors
    ///
    /// Returns `ChannelArityMismatch` if `values` or `bounds` does not match
    /// the channel's parameter count
    pub fn set_sample_with_bounds(
        &mut self,
        id: ChannelId,
        values: &[f64],
        bounds: &[f64],
    ) -> Result<()> {
        self.store(id, values, Some(bounds))
    }

    fn store(&mut self, id: ChannelId, values: &[f64], bounds: Option<&[f64]>) -> Result<()> {
        let channel = &mut self.channels[id.index()];

        let expected = channel.parameter_count as usize;
        if values.len() != expected {
            return Err(SensorBridgeError::ChannelArityMismatch {
                channel: id.name(),
                expected,
                got: values.len(),
            });
        }
        if let Some(bounds) = bounds {
            if bounds.len() != expected {
                return Err(SensorBridgeError::ChannelArityMismatch {
                    channel: id.name(),
                    expected,
                    got: bounds.len(),
                });
            }
        }

        for (i, &value) in values.iter().enumerate() {
            let clamp_max = bounds.map_or(channel.clamp_max, |b| b[i]);
            let quantized = quant::scale(value, clamp_max, channel.byte_width)?;
            let encoded = quant::encode(quantized, channel.byte_width)?;

            channel.raw_values[i] = value;
            channel.quantized_values[i] = quantized;
            channel.encoded_values[i] = encoded;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(&SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_new_registry_seeds_zero_samples() {
        let registry = registry();

        for channel in registry.channels() {
            assert_eq!(channel.raw_values().len(), 3);
            assert_eq!(channel.quantized_values(), &[0, 0, 0]);
            for encoded in channel.encoded_values() {
                assert_eq!(encoded.as_ref(), &[0, 0], "2-byte zero encoding expected");
            }
        }
    }

    #[test]
    fn test_channels_iterate_in_transmission_order() {
        let registry = registry();
        let ids: Vec<ChannelId> = registry.channels().map(|c| c.id).collect();
        assert_eq!(ids, ChannelId::ALL);
    }

    #[test]
    fn test_set_sample_updates_all_three_views() {
        let mut registry = registry();

        registry
            .set_sample(ChannelId::Accelerometer, &[3.0, -3.0, 0.0])
            .unwrap();

        let channel = registry.channel(ChannelId::Accelerometer);
        assert_eq!(channel.raw_values(), &[3.0, -3.0, 0.0]);
        assert_eq!(channel.quantized_values(), &[32767, -32767, 0]);
        assert_eq!(channel.encoded_values()[0].as_ref(), &[0xFF, 0x7F]);
        assert_eq!(channel.encoded_values()[1].as_ref(), &[0x01, 0x80]);
        assert_eq!(channel.encoded_values()[2].as_ref(), &[0x00, 0x00]);
    }

    #[test]
    fn test_set_sample_overwrites_previous_sample() {
        let mut registry = registry();

        registry
            .set_sample(ChannelId::Gyroscope, &[1.0, 1.0, 1.0])
            .unwrap();
        registry
            .set_sample(ChannelId::Gyroscope, &[-1.0, -1.0, -1.0])
            .unwrap();

        let channel = registry.channel(ChannelId::Gyroscope);
        assert_eq!(channel.raw_values(), &[-1.0, -1.0, -1.0]);
        assert!(channel.quantized_values().iter().all(|&q| q < 0));
    }

    #[test]
    fn test_set_sample_rejects_wrong_arity() {
        let mut registry = registry();

        let result = registry.set_sample(ChannelId::Location, &[1.0, 2.0]);
        assert!(matches!(
            result,
            Err(SensorBridgeError::ChannelArityMismatch {
                channel: "location",
                expected: 3,
                got: 2,
            })
        ));

        // A failed write must leave the previous sample intact
        let channel = registry.channel(ChannelId::Location);
        assert_eq!(channel.raw_values(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_set_sample_with_bounds_uses_per_parameter_clamp() {
        let mut registry = registry();

        // Latitude and longitude scale against their own ranges, altitude
        // against the channel's configured bound
        registry
            .set_sample_with_bounds(
                ChannelId::Location,
                &[90.0, -180.0, 50.0],
                &[90.0, 180.0, 100.0],
            )
            .unwrap();

        let channel = registry.channel(ChannelId::Location);
        assert_eq!(channel.quantized_values()[0], 32767);
        assert_eq!(channel.quantized_values()[1], -32767);
        assert_eq!(channel.quantized_values()[2], 16383);
    }

    #[test]
    fn test_set_sample_with_bounds_rejects_wrong_bounds_arity() {
        let mut registry = registry();

        let result =
            registry.set_sample_with_bounds(ChannelId::Location, &[1.0, 2.0, 3.0], &[90.0]);
        assert!(matches!(
            result,
            Err(SensorBridgeError::ChannelArityMismatch { got: 1, .. })
        ));
    }

    #[test]
    fn test_registry_rejects_invalid_width_config() {
        let mut config = SessionConfig::default();
        config.accelerometer.byte_width = 3;

        assert!(matches!(
            ChannelRegistry::new(&config),
            Err(SensorBridgeError::InvalidByteWidth(3))
        ));
    }
}
