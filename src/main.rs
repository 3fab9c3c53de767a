//! # Sensor Bridge
//!
//! Stream quantized phone sensor readings to a microcontroller over a BLE
//! UART link.
//!
//! The binary loads the persisted session configuration, opens the bridge
//! device, starts the sensor pollers and runs one transmission session
//! until Ctrl+C or a session failure.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use sensor_bridge::config::SessionConfig;
use sensor_bridge::link::BleUartLink;
use sensor_bridge::registry::ChannelRegistry;
use sensor_bridge::sensors::SensorPool;
use sensor_bridge::session::{self, SessionEvent};

/// Where the session configuration is persisted between runs
const DEFAULT_CONFIG_PATH: &str = "config/session.toml";

/// Main entry point for the Sensor Bridge application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load the persisted session configuration (defaults on first run or
///      after a damaged store)
///    - Open the serial port of the BLE UART bridge
///
/// 2. **Session**
///    - Start the sensor pollers and the transmission session
///    - The session performs the configuration handshake, then streams
///      data fragments at the configured baudrate
///
/// 3. **Shutdown**
///    - Ctrl+C stops the session cleanly
///    - A session failure (for example a watchdog timeout) is reported and
///      ends the process; restarting it begins a fresh handshake
///
/// # Errors
///
/// Returns error if no bridge device is found or the configuration cannot
/// support a session.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Sensor Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = SessionConfig::load_or_default(&config_path);
    info!(
        "session configuration: {} frames/s, {} channels enabled",
        config.baudrate,
        config.enabled_channel_count()
    );

    let registry = Arc::new(Mutex::new(ChannelRegistry::new(&config)?));

    let (link, inbound) = BleUartLink::open()?;
    info!("bridge device opened at: {}", link.device_path());

    let pool = SensorPool::with_default_sources(Arc::clone(&registry), &config);
    let (mut handle, mut events) =
        session::start(config, registry, Box::new(link), inbound, pool)?;

    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                handle.stop().await;
                break;
            }

            event = events.recv() => {
                match event {
                    Some(SessionEvent::ConfigurationAcknowledged) => {
                        info!("peer accepted the configuration, streaming data");
                    }
                    Some(SessionEvent::HealthUpdated(health)) => {
                        let status = handle.status().await;
                        debug!(
                            "connection health {:.0}% after {} frames",
                            health * 100.0,
                            status.frames_sent
                        );
                    }
                    Some(SessionEvent::Failed(e)) => {
                        error!("session failed: {}", e);
                        error!(
                            "the microcontroller is not responding; check the \
                             peer and start a new session"
                        );
                        handle.stop().await;
                        break;
                    }
                    None => {
                        error!("session ended unexpectedly");
                        break;
                    }
                }
            }
        }
    }

    let status = handle.status().await;
    info!("total frames sent: {}", status.frames_sent);

    Ok(())
}
