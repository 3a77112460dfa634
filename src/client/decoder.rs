//! Client-side reassembly of the relay wire stream
//!
//! Mirror image of the server's segmenter: inbound binary messages are
//! either a single control byte (only meaningful between frames) or chunks
//! of one JPEG image, where a chunk shorter than [`MAX_PACKET_SIZE`] closes
//! the image. Oversized images are capture results, not live frames.

use bytes::{Bytes, BytesMut};

use crate::protocol::{ControlSignal, DEFAULT_HIGH_RES_THRESHOLD, MAX_PACKET_SIZE};

/// A decoded unit of the viewer's inbound stream
#[derive(Debug, Clone)]
pub enum DecodedUnit {
    /// Out-of-band signal from the relay
    Control(ControlSignal),
    /// One complete live frame
    LiveFrame(Bytes),
    /// The result of an explicit capture request
    CaptureResult(Bytes),
}

/// Per-connection state machine over inbound wire messages
///
/// States are implicit in the buffer: empty means idle, non-empty means a
/// frame is accumulating.
pub struct FrameDecoder {
    buffer: BytesMut,
    high_res_threshold: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default capture threshold
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_HIGH_RES_THRESHOLD)
    }

    /// Create a decoder treating blobs above `threshold` as capture results
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            high_res_threshold: threshold,
        }
    }

    /// Feed one inbound binary message
    pub fn push(&mut self, payload: Bytes) -> Option<DecodedUnit> {
        if payload.len() == 1 && self.buffer.is_empty() {
            return match ControlSignal::from_byte(payload[0]) {
                Some(signal) => Some(DecodedUnit::Control(signal)),
                None => {
                    tracing::debug!(byte = payload[0], "Dropping unknown control byte");
                    None
                }
            };
        }

        let is_final = payload.len() < MAX_PACKET_SIZE;
        self.buffer.extend_from_slice(&payload);

        if !is_final {
            return None;
        }

        let blob = self.buffer.split().freeze();

        if blob.len() > self.high_res_threshold {
            tracing::debug!(len = blob.len(), "Capture result received");
            Some(DecodedUnit::CaptureResult(blob))
        } else {
            Some(DecodedUnit::LiveFrame(blob))
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
