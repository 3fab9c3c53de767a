//! # Link Module
//!
//! Handles communication with the BLE UART bridge module.
//!
//! This module handles:
//! - Opening the serial port of the bridge at 9,600 baud
//! - Enforcing the 20-byte per-transmission cap
//! - Forwarding inbound bytes from the peer to the transport session
//!
//! The bridge module (an HM-10-class BLE UART adapter) relays every byte
//! written to its serial side over the air and delivers peer bytes back the
//! same way, so the session only ever deals in byte frames.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::error::{Result, SensorBridgeError};
use crate::wire::protocol::LINK_MTU;

pub mod port_trait;
pub use port_trait::LinkIO;

/// Baud rate of the BLE UART bridge (HM-10 factory default)
pub const LINK_BAUD_RATE: u32 = 9_600;

/// Buffered inbound messages before the reader applies backpressure
const INBOUND_CHANNEL_CAPACITY: usize = 32;

/// Default bridge device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC devices
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Check a frame against the per-transmission cap of the link
///
/// # Errors
///
/// Returns `FrameExceedsMtu` for frames longer than 20 bytes
pub fn ensure_mtu(frame: &[u8]) -> Result<()> {
    if frame.len() > LINK_MTU {
        return Err(SensorBridgeError::FrameExceedsMtu(frame.len()));
    }
    Ok(())
}

/// BLE UART bridge handler
///
/// Owns the write half of the serial port; the read half runs in a
/// background task that forwards inbound chunks to the session. Dropping
/// the handler stops that task, handing inbound delivery back to whoever
/// opens the port next.
pub struct BleUartLink {
    /// Write half of the serial port
    writer: WriteHalf<tokio_serial::SerialStream>,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
    /// Background task draining the read half
    reader_task: JoinHandle<()>,
}

impl std::fmt::Debug for BleUartLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleUartLink")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl BleUartLink {
    /// Open the bridge, auto-detecting the device from common paths
    ///
    /// Returns the link plus the receiver on which inbound peer bytes are
    /// delivered.
    ///
    /// # Errors
    ///
    /// Returns error if no bridge device is found or the port cannot be
    /// configured
    pub fn open() -> Result<(Self, mpsc::Receiver<Vec<u8>>)> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS)
    }

    /// Open the bridge trying the given device paths in order
    pub fn open_with_paths(paths: &[&str]) -> Result<(Self, mpsc::Receiver<Vec<u8>>)> {
        for path in paths {
            debug!("trying to open link device: {}", path);

            match Self::open_port(path) {
                Ok(port) => {
                    info!("opened BLE UART bridge at {}", path);
                    let (reader, writer) = tokio::io::split(port);
                    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
                    let reader_task = tokio::spawn(forward_inbound(reader, inbound_tx));

                    let link = Self {
                        writer,
                        device_path: path.to_string(),
                        reader_task,
                    };
                    return Ok((link, inbound_rx));
                }
                Err(e) => {
                    warn!("failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(SensorBridgeError::LinkPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with the bridge settings
    fn open_port(path: &str) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, LINK_BAUD_RATE)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| SensorBridgeError::Link(format!("failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened bridge
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl Drop for BleUartLink {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[async_trait]
impl LinkIO for BleUartLink {
    async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        ensure_mtu(frame)?;

        self.writer
            .write_all(frame)
            .await
            .map_err(|e| SensorBridgeError::Link(format!("failed to write frame: {}", e)))?;

        self.writer
            .flush()
            .await
            .map_err(|e| SensorBridgeError::Link(format!("failed to flush link: {}", e)))?;

        debug!("sent frame ({} bytes)", frame.len());
        Ok(())
    }
}

/// Drain the read half of the port and forward each chunk to the session
async fn forward_inbound(
    mut reader: ReadHalf<tokio_serial::SerialStream>,
    inbound: mpsc::Sender<Vec<u8>>,
) {
    let mut buffer = [0u8; 64];

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => {
                warn!("link closed by the bridge");
                break;
            }
            Ok(n) => {
                debug!("received {} bytes from peer", n);
                if inbound.send(buffer[..n].to_vec()).await.is_err() {
                    // Session side went away; nothing left to deliver to
                    break;
                }
            }
            Err(e) => {
                warn!("link read error: {}", e);
                break;
            }
        }
    }
}
