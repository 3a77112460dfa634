//! Viewer-side client
//!
//! Everything a viewer needs: connect to a relay, reassemble the live
//! stream, render frames to attached [`FrameSink`]s, and take one-shot
//! high-resolution photos with [`StreamClient::photograph`].

pub mod config;
pub mod decoder;
pub mod photo;
pub mod stream;

pub use config::ClientConfig;
pub use decoder::{DecodedUnit, FrameDecoder};
pub use photo::PhotoRequestTracker;
pub use stream::{FrameSink, StreamClient, ViewerEvent};
