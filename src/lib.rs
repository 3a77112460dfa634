//! # camrelay
//!
//! Relay a continuous JPEG stream from one camera to any number of browser
//! viewers over a framed binary WebSocket protocol, with collective
//! power management and one-shot high-resolution captures.
//!
//! An external capture process owns the camera hardware and serves raw JPEG
//! packets on a local TCP port; the relay fans those out, and each viewer
//! can pause its own stream, resume it, or request a photo. The camera only
//! runs while at least one viewer is actually watching.
//!
//! # Architecture
//!
//! ```text
//!  capture process ──TCP──► CameraLink ──► FrameSegmenter
//!       ▲                                      │ frames / control bytes
//!       │ capture/pause/                       ▼
//!       │ resume/shutdown               ViewerRegistry ──► per-viewer
//!       │                                      ▲           queues ──► WS
//!       └────────── CommandRouter ◄────────────┘
//!
//!  (per viewer)  WS ──► FrameDecoder ──► FrameSink / PhotoRequestTracker
//! ```
//!
//! # Wire format
//!
//! Server to client, all binary: either a single control byte (`0x55`
//! high-res image incoming, `0x33` camera in use) or one JPEG image split
//! into chunks of at most 65536 bytes, where a shorter chunk ends the
//! image. Client to server: the text commands `capture`, `pause`, `resume`.
//! The WebSocket subprotocol identifier is `jpeg-meta`.
//!
//! # Example
//!
//! ```no_run
//! use camrelay::relay::{RelayConfig, RelayServer};
//!
//! #[tokio::main]
//! async fn main() -> camrelay::error::Result<()> {
//!     let server = RelayServer::new(RelayConfig::default());
//!     server.run().await
//! }
//! ```

pub mod camera;
pub mod client;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod segment;

pub use error::{Error, Result};
pub use relay::{RelayConfig, RelayServer};
