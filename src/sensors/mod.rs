//! # Sensors Module
//!
//! Periodic pollers that feed the channel registry.
//!
//! Each enabled channel gets its own polling task that reads a
//! [`SensorSource`] at the session's refresh interval and writes the sample
//! into the registry's latest-value slot. The pollers are the registry's
//! only writers. Timing is per channel and not synchronized across
//! channels.
//!
//! The crate ships synthetic sources that stand in for the platform
//! sensors; real hardware plugs in through the same trait.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::registry::{ChannelId, ChannelRegistry};

/// Per-parameter clamp bounds for the location channel
///
/// Latitude spans 90 degrees either way and longitude 180; altitude uses
/// the channel's configured clamp bound.
pub fn location_bounds(clamp_max: f64) -> [f64; 3] {
    [90.0, 180.0, clamp_max]
}

/// One sensor's reading side
pub trait SensorSource: Send + Sync + 'static {
    /// Read the current sample, one value per configured parameter
    fn sample(&mut self) -> Vec<f64>;
}

/// Source that always reports the same sample
pub struct ConstantSource {
    values: Vec<f64>,
}

impl ConstantSource {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }
}

impl SensorSource for ConstantSource {
    fn sample(&mut self) -> Vec<f64> {
        self.values.clone()
    }
}

/// Deterministic waveform source sweeping every axis through its range
///
/// Each axis follows the same sine wave a quarter turn apart, so the
/// quantizer sees the whole span between the clamp bounds over time.
pub struct WaveformSource {
    amplitude: f64,
    axes: usize,
    step: f64,
    phase: f64,
}

impl WaveformSource {
    pub fn new(amplitude: f64, axes: usize, step: f64) -> Self {
        Self {
            amplitude,
            axes,
            step,
            phase: 0.0,
        }
    }
}

impl SensorSource for WaveformSource {
    fn sample(&mut self) -> Vec<f64> {
        self.phase += self.step;
        (0..self.axes)
            .map(|axis| {
                let offset = axis as f64 * std::f64::consts::FRAC_PI_2;
                self.amplitude * (self.phase + offset).sin()
            })
            .collect()
    }
}

/// The polling tasks of one session
///
/// A pool drives exactly one session: register sources, start it with the
/// session and stop it when the session ends.
pub struct SensorPool {
    registry: Arc<Mutex<ChannelRegistry>>,
    sources: Vec<(ChannelId, Box<dyn SensorSource>)>,
    tasks: Vec<JoinHandle<()>>,
}

impl SensorPool {
    pub fn new(registry: Arc<Mutex<ChannelRegistry>>) -> Self {
        Self {
            registry,
            sources: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Pool with a synthetic source for every enabled channel
    pub fn with_default_sources(
        registry: Arc<Mutex<ChannelRegistry>>,
        config: &SessionConfig,
    ) -> Self {
        let mut pool = Self::new(registry);

        if config.accelerometer.enabled {
            pool.register(
                ChannelId::Accelerometer,
                Box::new(WaveformSource::new(
                    config.accelerometer.clamp_max * 0.5,
                    config.accelerometer.parameter_count as usize,
                    0.1,
                )),
            );
        }

        if config.location.enabled {
            let source: Box<dyn SensorSource> = if config.location.parameter_count == 3 {
                // A fixed point on the DTU campus in Lyngby
                Box::new(ConstantSource::new(vec![55.7861, 12.5234, 40.0]))
            } else {
                Box::new(ConstantSource::new(vec![
                    0.0;
                    config.location.parameter_count as usize
                ]))
            };
            pool.register(ChannelId::Location, source);
        }

        if config.gyroscope.enabled {
            pool.register(
                ChannelId::Gyroscope,
                Box::new(WaveformSource::new(
                    config.gyroscope.clamp_max * 0.5,
                    config.gyroscope.parameter_count as usize,
                    0.25,
                )),
            );
        }

        pool
    }

    /// Register a source for one channel, replacing any previous source
    pub fn register(&mut self, id: ChannelId, source: Box<dyn SensorSource>) {
        self.sources.retain(|(existing, _)| *existing != id);
        self.sources.push((id, source));
    }

    /// Spawn one polling task per registered source
    ///
    /// A pool that was already started keeps its running tasks.
    pub fn start(&mut self, interval: Duration) {
        if !self.tasks.is_empty() {
            return;
        }

        for (id, mut source) in self.sources.drain(..) {
            let registry = Arc::clone(&self.registry);

            let task = tokio::spawn(async move {
                let mut ticker = time::interval(interval);
                ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

                loop {
                    ticker.tick().await;

                    let values = source.sample();
                    let mut registry = registry.lock().await;

                    let result = if id == ChannelId::Location && values.len() == 3 {
                        let clamp_max = registry.channel(id).clamp_max;
                        registry.set_sample_with_bounds(
                            id,
                            &values,
                            &location_bounds(clamp_max),
                        )
                    } else {
                        registry.set_sample(id, &values)
                    };

                    if let Err(e) = result {
                        warn!("dropping {} sample: {}", id.name(), e);
                    }
                }
            });

            self.tasks.push(task);
        }

        debug!("started {} sensor pollers", self.tasks.len());
    }

    /// Stop every poller; safe to call repeatedly or before start
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SensorPool {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_constant_source_repeats_its_sample() {
        let mut source = ConstantSource::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(source.sample(), vec![1.0, 2.0, 3.0]);
        assert_eq!(source.sample(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_waveform_source_stays_within_amplitude() {
        let mut source = WaveformSource::new(2.0, 3, 0.3);

        for _ in 0..200 {
            let sample = source.sample();
            assert_eq!(sample.len(), 3);
            for value in sample {
                assert!(value.abs() <= 2.0, "waveform exceeded its amplitude");
            }
        }
    }

    #[test]
    fn test_waveform_source_changes_between_samples() {
        let mut source = WaveformSource::new(1.0, 1, 0.5);
        let first = source.sample();
        let second = source.sample();
        assert_ne!(first, second);
    }

    #[test]
    fn test_location_bounds_uses_geographic_ranges() {
        assert_eq!(location_bounds(100.0), [90.0, 180.0, 100.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_writes_samples_into_the_registry() {
        let config = SessionConfig::default();
        let registry = Arc::new(Mutex::new(ChannelRegistry::new(&config).unwrap()));

        let mut pool = SensorPool::new(Arc::clone(&registry));
        pool.register(
            ChannelId::Accelerometer,
            Box::new(ConstantSource::new(vec![1.0, 2.0, 3.0])),
        );
        pool.start(Duration::from_millis(10));

        settle().await;
        time::advance(Duration::from_millis(15)).await;
        settle().await;

        {
            let registry = registry.lock().await;
            let channel = registry.channel(ChannelId::Accelerometer);
            assert_eq!(channel.raw_values(), &[1.0, 2.0, 3.0]);
        }

        pool.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_poller_applies_per_axis_bounds() {
        let config = SessionConfig::default();
        let registry = Arc::new(Mutex::new(ChannelRegistry::new(&config).unwrap()));

        let mut pool = SensorPool::new(Arc::clone(&registry));
        pool.register(
            ChannelId::Location,
            Box::new(ConstantSource::new(vec![90.0, -180.0, 0.0])),
        );
        pool.start(Duration::from_millis(10));

        settle().await;
        time::advance(Duration::from_millis(15)).await;
        settle().await;

        {
            let registry = registry.lock().await;
            let channel = registry.channel(ChannelId::Location);
            assert_eq!(
                channel.quantized_values(),
                &[32767, -32767, 0],
                "latitude and longitude must scale against their own ranges"
            );
        }

        pool.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_pool_writes_nothing_more() {
        let config = SessionConfig::default();
        let registry = Arc::new(Mutex::new(ChannelRegistry::new(&config).unwrap()));

        let mut pool = SensorPool::new(Arc::clone(&registry));
        pool.register(
            ChannelId::Gyroscope,
            Box::new(WaveformSource::new(1.0, 3, 0.5)),
        );
        pool.start(Duration::from_millis(10));

        settle().await;
        time::advance(Duration::from_millis(15)).await;
        settle().await;

        pool.stop();
        pool.stop(); // repeated stop is a no-op

        let before = registry
            .lock()
            .await
            .channel(ChannelId::Gyroscope)
            .raw_values()
            .to_vec();

        time::advance(Duration::from_millis(50)).await;
        settle().await;

        let after = registry
            .lock()
            .await
            .channel(ChannelId::Gyroscope)
            .raw_values()
            .to_vec();
        assert_eq!(before, after, "aborted pollers must not keep writing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_sources_cover_enabled_channels_only() {
        let mut config = SessionConfig::default();
        config.location.enabled = false;

        let registry = Arc::new(Mutex::new(ChannelRegistry::new(&config).unwrap()));
        let mut pool = SensorPool::with_default_sources(Arc::clone(&registry), &config);
        pool.start(Duration::from_millis(10));

        settle().await;
        time::advance(Duration::from_millis(15)).await;
        settle().await;

        {
            let registry = registry.lock().await;
            let accel = registry.channel(ChannelId::Accelerometer);
            assert!(
                accel.raw_values().iter().any(|&v| v != 0.0),
                "enabled channel must receive samples"
            );

            let location = registry.channel(ChannelId::Location);
            assert_eq!(
                location.raw_values(),
                &[0.0, 0.0, 0.0],
                "disabled channel must stay at its seeded sample"
            );
        }

        pool.stop();
    }
}
