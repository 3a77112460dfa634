//! Relay server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::{DEFAULT_CAMERA_PORT, DEFAULT_HIGH_RES_THRESHOLD, DEFAULT_RELAY_PORT};

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the WebSocket endpoint binds to
    pub bind_addr: SocketAddr,

    /// Address of the camera capture process
    pub camera_addr: SocketAddr,

    /// Maximum concurrent viewers; further connections are refused
    pub max_viewers: usize,

    /// Delay between camera reconnect attempts
    pub reconnect_delay: Duration,

    /// Frames larger than this are capture results, not live frames
    pub high_res_threshold: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_RELAY_PORT)),
            camera_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_CAMERA_PORT)),
            max_viewers: 10,
            reconnect_delay: Duration::from_millis(1000),
            high_res_threshold: DEFAULT_HIGH_RES_THRESHOLD,
        }
    }
}

impl RelayConfig {
    /// Create a config with a custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the camera address
    pub fn camera(mut self, addr: SocketAddr) -> Self {
        self.camera_addr = addr;
        self
    }

    /// Set the viewer limit
    pub fn max_viewers(mut self, max: usize) -> Self {
        self.max_viewers = max;
        self
    }

    /// Set the camera reconnect delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the capture result size threshold
    pub fn high_res_threshold(mut self, threshold: usize) -> Self {
        self.high_res_threshold = threshold;
        self
    }
}
