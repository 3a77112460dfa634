//! Wire protocol constants and classification types
//!
//! The relay multiplexes two kinds of server-to-viewer payloads onto one
//! binary channel: single out-of-band control bytes, and JPEG images split
//! into chunks of at most [`MAX_PACKET_SIZE`] bytes. A chunk shorter than
//! `MAX_PACKET_SIZE` marks the end of the current image; receivers never
//! need any other framing information.

use bytes::Bytes;

/// WebSocket subprotocol negotiated between relay and viewers
pub const SUBPROTOCOL: &str = "jpeg-meta";

/// Default WebSocket port the relay listens on
pub const DEFAULT_RELAY_PORT: u16 = 9998;

/// Default TCP port of the external camera capture process
pub const DEFAULT_CAMERA_PORT: u16 = 9997;

/// Maximum size of a single wire chunk
///
/// Any chunk shorter than this terminates the image it belongs to.
pub const MAX_PACKET_SIZE: usize = 65536;

/// Trailing byte of the JPEG end-of-image marker (0xFF 0xD9)
///
/// Advisory only: the marker can straddle a chunk boundary, so finality is
/// decided by chunk size, never by this byte.
pub const JPEG_EOI_TRAILER: u8 = 0xD9;

/// Frames larger than this are capture results rather than live frames
pub const DEFAULT_HIGH_RES_THRESHOLD: usize = 100_000;

/// Single-byte control signal multiplexed onto the image channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// A full-resolution image is about to follow (0x55)
    FullImageIncoming,
    /// The camera is busy taking a high-resolution capture (0x33)
    CameraInUse,
}

impl ControlSignal {
    /// Decode a control signal from its wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x55 => Some(ControlSignal::FullImageIncoming),
            0x33 => Some(ControlSignal::CameraInUse),
            _ => None,
        }
    }

    /// Wire byte for this signal
    pub fn as_byte(self) -> u8 {
        match self {
            ControlSignal::FullImageIncoming => 0x55,
            ControlSignal::CameraInUse => 0x33,
        }
    }
}

/// Text command a viewer may send to the relay
///
/// Anything outside this set is ignored without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    /// Request a one-shot high-resolution capture
    Capture,
    /// Stop receiving live frames
    Pause,
    /// Start receiving live frames again
    Resume,
}

impl ViewerCommand {
    /// Parse a viewer text frame into a command
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "capture" => Some(ViewerCommand::Capture),
            "pause" => Some(ViewerCommand::Pause),
            "resume" => Some(ViewerCommand::Resume),
            _ => None,
        }
    }

    /// Wire representation of this command
    pub fn as_str(self) -> &'static str {
        match self {
            ViewerCommand::Capture => "capture",
            ViewerCommand::Pause => "pause",
            ViewerCommand::Resume => "resume",
        }
    }
}

/// ASCII command written to the camera capture process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraCommand {
    /// Switch to the high-quality configuration and take one picture
    Capture,
    /// Stop streaming frames
    Pause,
    /// Start streaming frames
    Resume,
    /// Terminate the capture process
    Shutdown,
}

impl CameraCommand {
    /// Wire representation of this command
    pub fn as_str(self) -> &'static str {
        match self {
            CameraCommand::Capture => "capture",
            CameraCommand::Pause => "pause",
            CameraCommand::Resume => "resume",
            CameraCommand::Shutdown => "shutdown",
        }
    }
}

/// Split a reassembled frame into wire chunks
///
/// Every chunk is at most [`MAX_PACKET_SIZE`] bytes and the final chunk is
/// always shorter, so receivers detect frame completion from size alone.
/// Frames whose length is an exact multiple of the packet size get an empty
/// trailing chunk as the terminator. The returned chunks are zero-copy
/// slices of the input `Bytes`.
pub fn chunk_frame(frame: &Bytes) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(frame.len() / MAX_PACKET_SIZE + 1);
    let mut offset = 0;

    while frame.len() - offset >= MAX_PACKET_SIZE {
        chunks.push(frame.slice(offset..offset + MAX_PACKET_SIZE));
        offset += MAX_PACKET_SIZE;
    }
    chunks.push(frame.slice(offset..));

    chunks
}
