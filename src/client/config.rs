//! Viewer client configuration

use crate::error::{Error, Result};
use crate::protocol::DEFAULT_HIGH_RES_THRESHOLD;

/// Client configuration options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay WebSocket URL
    pub url: String,

    /// Frames larger than this resolve photograph() calls instead of being
    /// rendered as live frames
    pub high_res_threshold: usize,
}

impl ClientConfig {
    /// Create a config for the relay at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            high_res_threshold: DEFAULT_HIGH_RES_THRESHOLD,
        }
    }

    /// Set the capture result size threshold
    pub fn high_res_threshold(mut self, threshold: usize) -> Self {
        self.high_res_threshold = threshold;
        self
    }

    /// Check the configuration before any connection attempt
    ///
    /// Configuration problems are fatal at setup and never retried.
    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(Error::Setup(format!(
                "relay URL must be ws:// or wss://, got '{}'",
                self.url
            )));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("ws://127.0.0.1:9998/")
    }
}
