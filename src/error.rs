//! Crate error types
//!
//! Most failures in the relay are handled locally (camera reconnects, dead
//! viewers are dropped); the variants here cover what is reported upward.

use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for relay and client operations
#[derive(Debug)]
pub enum Error {
    /// I/O failure on the camera or listener socket
    Io(io::Error),

    /// WebSocket transport failure
    Transport(tokio_tungstenite::tungstenite::Error),

    /// Viewer limit reached; the new connection is refused
    CapacityExceeded {
        /// Configured viewer limit
        max: usize,
    },

    /// The viewer's outbound channel is gone (disconnected mid-delivery)
    ViewerGone,

    /// Client-side configuration is unusable; fatal at setup, never retried
    Setup(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Transport(e) => write!(f, "WebSocket error: {}", e),
            Error::CapacityExceeded { max } => {
                write!(f, "Viewer limit reached ({} viewers)", max)
            }
            Error::ViewerGone => write!(f, "Viewer disconnected"),
            Error::Setup(msg) => write!(f, "Setup error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(e)
    }
}
