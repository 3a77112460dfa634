//! Server-side relay
//!
//! The relay ingests the raw camera byte stream, segments it into frames
//! and control signals, and fans each unit out to every connected viewer
//! over WebSocket. Viewers steer the camera with text commands; their
//! collective pause state decides whether the camera runs at all.
//!
//! # Architecture
//!
//! ```text
//!   camera TCP ──► CameraLink ──► FrameSegmenter ──► ViewerRegistry
//!                      ▲               (pump)          broadcast()
//!                      │                             ┌─────┼─────┐
//!                 CameraCommand                      ▼     ▼     ▼
//!                 (resume/pause/                 [queue] [queue] [queue]
//!                  capture)                         │       │       │
//!                      ▲                            ▼       ▼       ▼
//!                      └── CommandRouter ◄──── viewer WebSockets
//! ```
//!
//! Each viewer owns an unbounded outbound queue drained by its own writer
//! task, so fan-out is non-blocking and a stalled viewer cannot hold up
//! the camera read loop or the other viewers.

pub mod commands;
pub mod config;
pub mod registry;
pub mod server;

pub use commands::CommandRouter;
pub use config::RelayConfig;
pub use registry::{ViewerId, ViewerRegistry};
pub use server::RelayServer;
