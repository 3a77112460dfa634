//! Frame segmentation of the raw camera byte stream
//!
//! The capture process writes JPEG images to its TCP socket in packets of at
//! most [`MAX_PACKET_SIZE`] bytes and signals "last packet of this image" by
//! sending a short final packet. Single bytes written between images are
//! out-of-band control signals. [`FrameSegmenter`] turns that raw chunk
//! stream back into discrete [`StreamUnit`]s.
//!
//! Finality is decided by packet size alone. The JPEG end-of-image marker is
//! only a hint: the two marker bytes can straddle a packet boundary, so a
//! missing trailer byte on a final packet is logged and otherwise ignored.

use bytes::{Bytes, BytesMut};

use crate::protocol::{
    ControlSignal, DEFAULT_HIGH_RES_THRESHOLD, JPEG_EOI_TRAILER, MAX_PACKET_SIZE,
};

/// Whether a reassembled frame belongs to the live stream or is the result
/// of an explicit capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Ordinary live stream frame
    Live,
    /// High-resolution capture result
    Capture,
}

/// One complete reassembled JPEG image
#[derive(Debug, Clone)]
pub struct FrameBlob {
    /// The image bytes, shared zero-copy between viewers
    pub data: Bytes,
    /// Live frame or capture result
    pub kind: FrameKind,
}

/// A classified unit of the camera stream
#[derive(Debug, Clone)]
pub enum StreamUnit {
    /// Out-of-band single-byte signal
    Control(ControlSignal),
    /// One complete frame
    Frame(FrameBlob),
}

/// Reassembles camera packets into frames and extracts control signals
///
/// Pure state machine: feed it chunks in arrival order with [`push`] and it
/// yields at most one unit per chunk.
///
/// [`push`]: FrameSegmenter::push
pub struct FrameSegmenter {
    buffer: BytesMut,
    high_res_threshold: usize,
}

impl FrameSegmenter {
    /// Create a segmenter with the default high-resolution threshold
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_HIGH_RES_THRESHOLD)
    }

    /// Create a segmenter tagging frames above `threshold` bytes as captures
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            high_res_threshold: threshold,
        }
    }

    /// Number of bytes buffered for the frame currently being reassembled
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one raw chunk from the camera connection
    ///
    /// A 1-byte chunk while no frame is in progress is a control signal and
    /// never touches the frame buffer; an unknown signal byte is dropped.
    /// Any other chunk is appended, and a chunk shorter than
    /// [`MAX_PACKET_SIZE`] completes the frame.
    pub fn push(&mut self, chunk: Bytes) -> Option<StreamUnit> {
        if chunk.len() == 1 && self.buffer.is_empty() {
            return match ControlSignal::from_byte(chunk[0]) {
                Some(signal) => Some(StreamUnit::Control(signal)),
                None => {
                    tracing::debug!(byte = chunk[0], "Dropping unknown control byte");
                    None
                }
            };
        }

        let is_final = chunk.len() < MAX_PACKET_SIZE;
        self.buffer.extend_from_slice(&chunk);

        if !is_final {
            return None;
        }

        let data = self.buffer.split().freeze();

        if data.last() != Some(&JPEG_EOI_TRAILER) {
            // Size rule is authoritative; the marker may have been split
            // across packets or the camera appended a signal byte.
            tracing::trace!(len = data.len(), "Final frame without JPEG trailer");
        }

        let kind = if data.len() > self.high_res_threshold {
            FrameKind::Capture
        } else {
            FrameKind::Live
        };

        tracing::trace!(len = data.len(), kind = ?kind, "Frame reassembled");

        Some(StreamUnit::Frame(FrameBlob { data, kind }))
    }
}

impl Default for FrameSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(len: usize, fill: u8) -> Bytes {
        Bytes::from(vec![fill; len])
    }

    #[test]
    fn test_single_short_packet_is_one_frame() {
        let mut seg = FrameSegmenter::new();

        let unit = seg.push(packet(3000, 0xAA)).unwrap();
        match unit {
            StreamUnit::Frame(blob) => {
                assert_eq!(blob.data.len(), 3000);
                assert_eq!(blob.kind, FrameKind::Live);
            }
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(seg.buffered(), 0);
    }

    #[test]
    fn test_multi_packet_frame_reassembled() {
        let mut seg = FrameSegmenter::new();

        assert!(seg.push(packet(MAX_PACKET_SIZE, 1)).is_none());
        assert_eq!(seg.buffered(), MAX_PACKET_SIZE);
        assert!(seg.push(packet(MAX_PACKET_SIZE, 2)).is_none());

        let unit = seg.push(packet(3000, 3)).unwrap();
        match unit {
            StreamUnit::Frame(blob) => {
                // 70000 + 70000 + 3000 analogue: 65536 * 2 + 3000
                assert_eq!(blob.data.len(), MAX_PACKET_SIZE * 2 + 3000);
                assert_eq!(blob.kind, FrameKind::Capture);
                assert_eq!(blob.data[0], 1);
                assert_eq!(blob.data[MAX_PACKET_SIZE], 2);
            }
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(seg.buffered(), 0);
    }

    #[test]
    fn test_one_byte_chunk_while_idle_is_control() {
        let mut seg = FrameSegmenter::new();

        let unit = seg.push(Bytes::from_static(&[0x33])).unwrap();
        match unit {
            StreamUnit::Control(signal) => {
                assert_eq!(signal, ControlSignal::CameraInUse)
            }
            other => panic!("expected control, got {:?}", other),
        }
        assert_eq!(seg.buffered(), 0);
    }

    #[test]
    fn test_one_byte_chunk_mid_frame_is_data() {
        let mut seg = FrameSegmenter::new();

        assert!(seg.push(packet(MAX_PACKET_SIZE, 0x55)).is_none());
        // A lone 0x55 now terminates the frame as its final byte
        let unit = seg.push(Bytes::from_static(&[0x55])).unwrap();
        match unit {
            StreamUnit::Frame(blob) => {
                assert_eq!(blob.data.len(), MAX_PACKET_SIZE + 1);
                assert_eq!(blob.data.last(), Some(&0x55));
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_control_byte_dropped() {
        let mut seg = FrameSegmenter::new();

        assert!(seg.push(Bytes::from_static(&[0x00])).is_none());
        assert_eq!(seg.buffered(), 0);
    }

    #[test]
    fn test_missing_trailer_is_still_final() {
        let mut seg = FrameSegmenter::new();

        // Last byte is not 0xD9; size decides anyway
        let unit = seg.push(packet(500, 0x10));
        assert!(matches!(unit, Some(StreamUnit::Frame(_))));
    }

    #[test]
    fn test_threshold_boundary() {
        let mut seg = FrameSegmenter::with_threshold(1000);

        match seg.push(packet(1000, 0)).unwrap() {
            StreamUnit::Frame(blob) => assert_eq!(blob.kind, FrameKind::Live),
            other => panic!("expected frame, got {:?}", other),
        }
        match seg.push(packet(1001, 0)).unwrap() {
            StreamUnit::Frame(blob) => assert_eq!(blob.kind, FrameKind::Capture),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_is_lossless_modulo_control_bytes() {
        let mut seg = FrameSegmenter::new();

        let chunks = vec![
            packet(MAX_PACKET_SIZE, 1),
            packet(400, 2),
            Bytes::from_static(&[0x33]),
            packet(200, 3),
            Bytes::from_static(&[0x55]),
            packet(MAX_PACKET_SIZE, 4),
            packet(MAX_PACKET_SIZE, 5),
            packet(0, 0),
        ];

        let mut input_minus_signals = Vec::new();
        let mut reassembled = Vec::new();
        let mut signals = 0;

        for chunk in chunks {
            let consumed_as_signal = chunk.len() == 1 && seg.buffered() == 0;
            if !consumed_as_signal {
                input_minus_signals.extend_from_slice(&chunk);
            }
            match seg.push(chunk) {
                Some(StreamUnit::Frame(blob)) => {
                    reassembled.extend_from_slice(&blob.data)
                }
                Some(StreamUnit::Control(_)) => signals += 1,
                None => {}
            }
        }

        assert_eq!(signals, 2);
        assert_eq!(reassembled, input_minus_signals);
    }

    #[test]
    fn test_zero_length_chunk_terminates_exact_multiple() {
        let mut seg = FrameSegmenter::new();

        assert!(seg.push(packet(MAX_PACKET_SIZE, 7)).is_none());
        let unit = seg.push(Bytes::new()).unwrap();
        match unit {
            StreamUnit::Frame(blob) => assert_eq!(blob.data.len(), MAX_PACKET_SIZE),
            other => panic!("expected frame, got {:?}", other),
        }
    }
}
