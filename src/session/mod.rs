//! # Transport Session Module
//!
//! Drives one transmission session against the microcontroller.
//!
//! This module handles:
//! - The configuration handshake followed by the repeating fragment cycle
//! - The periodic send ticker derived from the configured baudrate
//! - The watchdog that declares the session dead without inbound activity
//! - Health estimation from the peer's received-frame reports
//! - Clean teardown of timers, sensors and link ownership on stop
//!
//! All three event sources (ticker, watchdog, inbound bytes) are serialized
//! onto one task, so no two state transitions ever run concurrently. A
//! busy flag additionally guards the send path: a tick that arrives while
//! the previous one is still executing is dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SensorBridgeError};
use crate::link::LinkIO;
use crate::registry::ChannelRegistry;
use crate::sensors::SensorPool;
use crate::wire::frame;

pub mod engine;
pub use engine::{InboundEvent, LinkState, TransmissionEngine};

/// Watchdog interval: with no inbound activity for this long the session
/// declares a communication error and tears itself down
pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(2);

/// Frames between periodic status log lines
const STATUS_LOG_INTERVAL_FRAMES: u64 = 100;

/// Buffered session events before older ones are dropped
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Notifications delivered to the session's owner
#[derive(Debug)]
pub enum SessionEvent {
    /// The peer accepted the configuration frame
    ConfigurationAcknowledged,
    /// The peer reported its received-frame count
    HealthUpdated(f64),
    /// The session died and has already torn itself down
    Failed(SensorBridgeError),
}

/// Snapshot of a running session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStatus {
    pub state: LinkState,
    /// Latest health estimate in [0, 1]
    pub health: f64,
    pub frames_sent: u64,
    /// Frames per second the ticker actually targets
    pub real_baudrate: f64,
}

/// Length of one send tick at the given configuration
///
/// A cycle that spans more than one fragment ticks proportionally faster,
/// so the peer still sees full cycles at the configured baudrate.
pub fn tick_period(config: &SessionConfig) -> Duration {
    let fragments = frame::calculate_fragment_count(config);

    let frames_per_second = if fragments > 1 {
        u64::from(config.baudrate) * fragments as u64
    } else {
        u64::from(config.baudrate)
    };

    Duration::from_secs_f64(1.0 / frames_per_second as f64)
}

/// Start a transmission session
///
/// Validates the configuration, spawns the session task and starts the
/// sensor pollers. Configuration problems surface here, before anything is
/// transmitted; runtime failures arrive asynchronously as
/// [`SessionEvent::Failed`] on the returned event channel.
///
/// # Errors
///
/// Returns error if the configuration fails validation or the
/// configuration frame cannot be built
pub fn start(
    config: SessionConfig,
    registry: Arc<Mutex<ChannelRegistry>>,
    link: Box<dyn LinkIO>,
    inbound: mpsc::Receiver<Vec<u8>>,
    pool: SensorPool,
) -> Result<(SessionHandle, mpsc::Receiver<SessionEvent>)> {
    config.validate()?;
    frame::build_configuration_frame(&config)?;

    let period = tick_period(&config);
    let status = Arc::new(Mutex::new(SessionStatus {
        state: LinkState::Configuring,
        health: 1.0,
        frames_sent: 0,
        real_baudrate: 1.0 / period.as_secs_f64(),
    }));

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (stop_tx, stop_rx) = watch::channel(false);

    let runner = SessionRunner {
        engine: TransmissionEngine::new(config),
        registry,
        link,
        inbound,
        events: events_tx,
        pool,
        busy: AtomicBool::new(false),
        status: Arc::clone(&status),
        frames_sent: 0,
    };

    let task = tokio::spawn(runner.run(stop_rx));

    let handle = SessionHandle {
        stop_tx,
        task: Some(task),
        status,
    };
    Ok((handle, events_rx))
}

/// Owner-side handle of a running session
pub struct SessionHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    status: Arc<Mutex<SessionStatus>>,
}

impl SessionHandle {
    /// Snapshot of the session's current state
    pub async fn status(&self) -> SessionStatus {
        *self.status.lock().await
    }

    /// Stop the session: disarm its timers, stop the sensor pollers and
    /// release the link
    ///
    /// Safe to call repeatedly, and after the session already failed.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// The session task: owns every mutable piece of session state
struct SessionRunner {
    engine: TransmissionEngine,
    registry: Arc<Mutex<ChannelRegistry>>,
    link: Box<dyn LinkIO>,
    inbound: mpsc::Receiver<Vec<u8>>,
    events: mpsc::Sender<SessionEvent>,
    pool: SensorPool,
    busy: AtomicBool,
    status: Arc<Mutex<SessionStatus>>,
    frames_sent: u64,
}

impl SessionRunner {
    async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        let period = tick_period(self.engine.config());
        self.pool.start(period);

        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        let mut watchdog_deadline = Instant::now() + WATCHDOG_INTERVAL;

        info!(
            "transmission started ({:.3} s tick period)",
            period.as_secs_f64()
        );

        let failure: Option<SensorBridgeError> = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.on_tick().await {
                        error!("fatal session fault: {}", e);
                        break Some(e);
                    }
                }

                _ = time::sleep_until(watchdog_deadline) => {
                    error!(
                        "no response from the peer within {:?}, stopping transmission",
                        WATCHDOG_INTERVAL
                    );
                    break Some(SensorBridgeError::CommunicationError);
                }

                received = self.inbound.recv() => {
                    match received {
                        Some(bytes) => {
                            watchdog_deadline = Instant::now() + WATCHDOG_INTERVAL;
                            self.on_receive(&bytes).await;
                        }
                        None => {
                            break Some(SensorBridgeError::Link(
                                "inbound delivery closed".to_string(),
                            ));
                        }
                    }
                }

                _ = stop_rx.changed() => {
                    info!("transmission stopped");
                    break None;
                }
            }
        };

        // Teardown order: sensors first, then the failure report. Timers die
        // with this task, and dropping the link hands inbound delivery back
        // to the port's next owner.
        self.pool.stop();
        if let Some(e) = failure {
            let _ = self.events.try_send(SessionEvent::Failed(e));
        }
    }

    /// One send tick, guarded by the busy flag
    async fn on_tick(&mut self) -> Result<()> {
        if self.busy.swap(true, Ordering::AcqRel) {
            debug!("previous tick still executing, dropping this tick");
            return Ok(());
        }

        let result = self.send_current_frame().await;
        self.busy.store(false, Ordering::Release);
        result
    }

    async fn send_current_frame(&mut self) -> Result<()> {
        let frame = {
            let registry = self.registry.lock().await;
            self.engine.next_frame(&registry)?
        };

        self.frames_sent += 1;

        // Fire-and-forget: the next cycle resends fresh data, so a failed
        // send is logged rather than retried
        if let Err(e) = self.link.send_frame(&frame).await {
            warn!("failed to send frame: {}", e);
        }

        if self.frames_sent % STATUS_LOG_INTERVAL_FRAMES == 0 {
            info!(
                "sent {} frames, connection health {:.0}%",
                self.frames_sent,
                self.engine.health() * 100.0
            );
        }

        self.update_status().await;
        Ok(())
    }

    async fn on_receive(&mut self, bytes: &[u8]) {
        match self.engine.handle_inbound(bytes) {
            InboundEvent::ConfigurationAcknowledged => {
                info!("peer acknowledged the configuration");
                let _ = self
                    .events
                    .try_send(SessionEvent::ConfigurationAcknowledged);
            }
            InboundEvent::HealthUpdated(health) => {
                debug!("connection health {:.0}%", health * 100.0);
                let _ = self.events.try_send(SessionEvent::HealthUpdated(health));
            }
            InboundEvent::Ignored => {
                debug!("ignored {} inbound bytes while configuring", bytes.len());
            }
        }

        self.update_status().await;
    }

    async fn update_status(&self) {
        let mut status = self.status.lock().await;
        status.state = self.engine.state();
        status.health = self.engine.health();
        status.frames_sent = self.frames_sent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::port_trait::mocks::MockLink;

    /// Let the session task process everything currently queued
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn session_setup(
        config: SessionConfig,
    ) -> (
        MockLink,
        mpsc::Sender<Vec<u8>>,
        SessionHandle,
        mpsc::Receiver<SessionEvent>,
    ) {
        let registry = Arc::new(Mutex::new(ChannelRegistry::new(&config).unwrap()));
        let link = MockLink::new();
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let pool = SensorPool::new(Arc::clone(&registry));

        let (handle, events) = start(
            config,
            registry,
            Box::new(link.clone()),
            inbound_rx,
            pool,
        )
        .unwrap();

        (link, inbound_tx, handle, events)
    }

    #[test]
    fn test_tick_period_single_fragment_follows_baudrate() {
        let mut config = SessionConfig::default();
        config.baudrate = 4;
        assert_eq!(tick_period(&config), Duration::from_secs_f64(0.25));
    }

    #[test]
    fn test_tick_period_shortens_for_multi_fragment_cycles() {
        let mut config = SessionConfig::default();
        config.baudrate = 2;
        config.accelerometer.byte_width = 4;
        config.location.byte_width = 4;
        config.gyroscope.byte_width = 4;

        // Two fragments per cycle at 2 cycles per second: 4 frames per second
        assert_eq!(tick_period(&config), Duration::from_secs_f64(0.25));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_configuration() {
        let mut config = SessionConfig::default();
        config.baudrate = 0;

        let registry =
            Arc::new(Mutex::new(ChannelRegistry::new(&SessionConfig::default()).unwrap()));
        let (_inbound_tx, inbound_rx) = mpsc::channel(1);
        let pool = SensorPool::new(Arc::clone(&registry));

        let result = start(
            config,
            registry,
            Box::new(MockLink::new()),
            inbound_rx,
            pool,
        );
        assert!(result.is_err(), "invalid configuration must not start");
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_resends_configuration_until_acknowledged() {
        let (link, _inbound_tx, mut handle, _events) =
            session_setup(SessionConfig::default());

        settle().await;
        time::advance(Duration::from_secs(1)).await;
        settle().await;

        let frames = link.get_sent_frames();
        assert!(frames.len() >= 2, "expected repeated configuration frames");
        for frame in &frames {
            assert_eq!(&frame[..2], b"CF", "only configuration frames before ack");
        }

        assert_eq!(handle.status().await.state, LinkState::Configuring);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_streams_fragments_after_ack() {
        let (link, inbound_tx, mut handle, mut events) =
            session_setup(SessionConfig::default());

        settle().await;
        inbound_tx.send(b"OK_CF".to_vec()).await.unwrap();
        settle().await;

        assert!(matches!(
            events.try_recv(),
            Ok(SessionEvent::ConfigurationAcknowledged)
        ));
        assert_eq!(handle.status().await.state, LinkState::SendingFirstFragment);

        time::advance(Duration::from_secs(1)).await;
        settle().await;

        let frames = link.get_sent_frames();
        let last = frames.last().expect("a data fragment should have been sent");
        assert_eq!(last.len(), 19, "default cycle is one 19-byte fragment");
        assert_eq!(last[0], 0, "data fragments carry a sequence header");

        for frame in &frames {
            assert!(frame.len() <= 20, "no frame may exceed the link MTU");
        }

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_report_reaches_the_owner() {
        let mut config = SessionConfig::default();
        config.baudrate = 10;
        let (_link, inbound_tx, mut handle, mut events) = session_setup(config);

        settle().await;
        inbound_tx.send(b"OK_CF".to_vec()).await.unwrap();
        settle().await;
        let _ = events.try_recv(); // drop the ack event

        inbound_tx.send(7i16.to_le_bytes().to_vec()).await.unwrap();
        settle().await;

        match events.try_recv() {
            Ok(SessionEvent::HealthUpdated(health)) => assert_eq!(health, 0.7),
            other => panic!("expected a health update, got {:?}", other),
        }
        assert_eq!(handle.status().await.health, 0.7);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_failure_without_inbound_activity() {
        let (_link, _inbound_tx, mut handle, mut events) =
            session_setup(SessionConfig::default());

        // No inbound activity at all: the watchdog fires at the 2 s mark
        let event = events.recv().await.expect("a failure event is due");
        assert!(matches!(
            event,
            SessionEvent::Failed(SensorBridgeError::CommunicationError)
        ));

        // Stop after the failure is still safe
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_activity_defers_the_watchdog() {
        let (_link, inbound_tx, mut handle, mut events) =
            session_setup(SessionConfig::default());

        settle().await;
        time::advance(Duration::from_millis(1500)).await;
        settle().await;

        // Any inbound bytes count as activity, even noise while configuring
        inbound_tx.send(b"noise".to_vec()).await.unwrap();
        settle().await;

        time::advance(Duration::from_millis(1500)).await;
        settle().await;
        assert!(
            events.try_recv().is_err(),
            "watchdog must not fire while the peer is active"
        );

        time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(matches!(
            events.try_recv(),
            Ok(SessionEvent::Failed(SensorBridgeError::CommunicationError))
        ));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (_link, _inbound_tx, mut handle, _events) =
            session_setup(SessionConfig::default());

        settle().await;
        handle.stop().await;
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_errors_do_not_kill_the_session() {
        let (link, inbound_tx, mut handle, mut events) =
            session_setup(SessionConfig::default());

        link.set_send_error("radio glitch");
        settle().await;
        inbound_tx.send(b"OK_CF".to_vec()).await.unwrap();
        settle().await;
        let _ = events.try_recv();

        time::advance(Duration::from_secs(1)).await;
        settle().await;

        // Only the watchdog may end the session, not a failed send
        assert!(events.try_recv().is_err());
        assert!(handle.status().await.frames_sent > 0);

        handle.stop().await;
    }
}
