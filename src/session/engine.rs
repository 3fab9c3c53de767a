//! # Transmission Automaton
//!
//! The synchronous core of the transport session: a three-state automaton
//! that decides which frame leaves on each tick and interprets inbound
//! bytes from the peer.
//!
//! State cycle:
//!
//! ```text
//! Configuring --"OK_CF"--> SendingFirstFragment <--> SendingFragments
//! ```
//!
//! While configuring, every tick resends the configuration frame until the
//! peer acknowledges it. After that, each cycle rebuilds the data payload
//! from the registry's latest samples, sends its first fragment and drains
//! the remaining fragments on the following ticks.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::config::SessionConfig;
use crate::error::{Result, SensorBridgeError};
use crate::registry::ChannelRegistry;
use crate::wire::frame;
use crate::wire::protocol::CONFIG_ACK_TOKEN;

/// Protocol states of one transmission session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Resending the configuration frame until the peer acknowledges it
    Configuring,
    /// Starting a fresh data cycle from the registry's latest samples
    SendingFirstFragment,
    /// Draining the queued fragments of the current cycle
    SendingFragments,
}

/// What an inbound message meant to the automaton
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InboundEvent {
    /// The peer accepted the configuration; data cycles may begin
    ConfigurationAcknowledged,
    /// The peer reported its received-frame count; carries the new health
    HealthUpdated(f64),
    /// The bytes meant nothing in the current state
    Ignored,
}

/// The transmission automaton
pub struct TransmissionEngine {
    config: SessionConfig,
    state: LinkState,
    /// Fragments of the in-flight data cycle still waiting to be sent
    window: VecDeque<Bytes>,
    /// Approximate delivery health reported by the peer, in [0, 1]
    health: f64,
}

impl TransmissionEngine {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: LinkState::Configuring,
            window: VecDeque::new(),
            health: 1.0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Latest connection health estimate, clamped to [0, 1]
    pub fn health(&self) -> f64 {
        self.health
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Produce the frame to transmit on this tick
    ///
    /// # Errors
    ///
    /// Configuration frame errors surface here while configuring;
    /// `FragmentationInvariantViolated` surfaces if a data cycle does not
    /// match its precalculated size. Both are fatal to the session.
    pub fn next_frame(&mut self, registry: &ChannelRegistry) -> Result<Bytes> {
        match self.state {
            LinkState::Configuring => frame::build_configuration_frame(&self.config),

            LinkState::SendingFirstFragment => {
                self.window = VecDeque::from(frame::build_cycle_frames(registry, &self.config)?);

                match self.window.pop_front() {
                    Some(first) => {
                        if !self.window.is_empty() {
                            self.state = LinkState::SendingFragments;
                        }
                        Ok(first)
                    }
                    // Fragmentation always yields at least one frame, so an
                    // empty cycle is an internal fault
                    None => Err(SensorBridgeError::FragmentationInvariantViolated {
                        expected: 1,
                        actual: 0,
                    }),
                }
            }

            LinkState::SendingFragments => match self.window.pop_front() {
                Some(next) => {
                    if self.window.is_empty() {
                        self.state = LinkState::SendingFirstFragment;
                    }
                    Ok(next)
                }
                // The window is never left empty in this state; recover by
                // starting a fresh cycle
                None => {
                    self.state = LinkState::SendingFirstFragment;
                    self.next_frame(registry)
                }
            },
        }
    }

    /// Interpret inbound bytes from the peer
    ///
    /// While configuring, only the exact acknowledgement token advances the
    /// automaton; everything else is ignored. Once data cycles run, the
    /// first two bytes are read as a little-endian signed received-frame
    /// count and folded into the health estimate. A message too short to
    /// carry a count is counted as zero frames received.
    pub fn handle_inbound(&mut self, bytes: &[u8]) -> InboundEvent {
        match self.state {
            LinkState::Configuring => {
                if bytes == CONFIG_ACK_TOKEN {
                    self.state = LinkState::SendingFirstFragment;
                    InboundEvent::ConfigurationAcknowledged
                } else {
                    InboundEvent::Ignored
                }
            }

            LinkState::SendingFirstFragment | LinkState::SendingFragments => {
                let received = if bytes.len() >= 2 {
                    i16::from_le_bytes([bytes[0], bytes[1]])
                } else {
                    0
                };
                self.health = self.estimate_health(received);
                InboundEvent::HealthUpdated(self.health)
            }
        }
    }

    /// Health heuristic: the ratio of peer-acknowledged frames to the
    /// configured baudrate
    ///
    /// The report is approximate by nature; a ratio outside [0, 1] (a peer
    /// reporting more frames than configured, or a garbled negative count)
    /// is clamped to 1 rather than propagated.
    fn estimate_health(&self, received: i16) -> f64 {
        let ratio = f64::from(received) / f64::from(self.config.baudrate);

        if (0.0..=1.0).contains(&ratio) {
            ratio
        } else {
            1.0
        }
    }
}
