//! Trait abstraction for the outbound side of the link to enable testing

use async_trait::async_trait;

use crate::error::Result;

/// Trait for sending one frame over the radio link
///
/// Sends are fire-and-forget: the peer never acknowledges an individual
/// frame, and a failed send is simply retried implicitly by the next cycle.
#[async_trait]
pub trait LinkIO: Send + Sync {
    /// Write one frame of at most 20 bytes to the link
    async fn send_frame(&mut self, frame: &[u8]) -> Result<()>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::SensorBridgeError;
    use std::sync::{Arc, Mutex};

    /// Mock link for testing
    #[derive(Clone)]
    pub struct MockLink {
        pub sent_frames: Arc<Mutex<Vec<Vec<u8>>>>,
        pub send_error: Arc<Mutex<Option<String>>>,
    }

    impl MockLink {
        pub fn new() -> Self {
            Self {
                sent_frames: Arc::new(Mutex::new(Vec::new())),
                send_error: Arc::new(Mutex::new(None)),
            }
        }

        pub fn get_sent_frames(&self) -> Vec<Vec<u8>> {
            self.sent_frames.lock().unwrap().clone()
        }

        pub fn set_send_error(&self, message: &str) {
            *self.send_error.lock().unwrap() = Some(message.to_string());
        }
    }

    #[async_trait]
    impl LinkIO for MockLink {
        async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
            if let Some(message) = self.send_error.lock().unwrap().clone() {
                return Err(SensorBridgeError::Link(message));
            }
            self.sent_frames.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }
}
