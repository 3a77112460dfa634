//! Viewer registry and fan-out
//!
//! The registry is the single owner of all per-viewer state: the indexed
//! viewer map, each viewer's paused flag, and the activation counter that
//! decides whether the camera should be running at all. Every mutation goes
//! through its methods under one lock, so the invariant "activation counter
//! equals the number of registered, unpaused viewers" holds at every unlock.
//!
//! Fan-out is per-viewer and non-blocking: each viewer has an unbounded
//! outbound queue drained by its own writer task, so a slow viewer never
//! stalls the camera read loop or delivery to the others. Frame payloads are
//! chunked once and the `Bytes` allocations are shared by all viewers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

use crate::error::Error;
use crate::protocol::{chunk_frame, CameraCommand};
use crate::segment::StreamUnit;

/// Identifier of one connected viewer
pub type ViewerId = u64;

/// One connected viewer
struct Viewer {
    /// Outbound wire chunks, drained by the connection's writer task
    tx: mpsc::UnboundedSender<Bytes>,
    /// Paused viewers stay registered but receive nothing
    paused: bool,
}

struct Inner {
    viewers: HashMap<ViewerId, Viewer>,
    /// Count of registered, unpaused viewers
    active: usize,
}

/// Registry of connected viewers, owning the activation counter
pub struct ViewerRegistry {
    inner: RwLock<Inner>,
    max_viewers: usize,
    next_id: AtomicU64,
    camera_tx: mpsc::UnboundedSender<CameraCommand>,
}

impl ViewerRegistry {
    /// Create a registry that reports activation transitions to `camera_tx`
    pub fn new(max_viewers: usize, camera_tx: mpsc::UnboundedSender<CameraCommand>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                viewers: HashMap::new(),
                active: 0,
            }),
            max_viewers,
            next_id: AtomicU64::new(1),
            camera_tx,
        }
    }

    /// Register a new viewer, unpaused by default
    ///
    /// The 0→1 activation transition resumes the camera. Fails with
    /// [`Error::CapacityExceeded`] once the viewer limit is reached; the
    /// caller refuses the connection explicitly.
    pub async fn register(&self, tx: mpsc::UnboundedSender<Bytes>) -> Result<ViewerId, Error> {
        let mut inner = self.inner.write().await;

        if inner.viewers.len() >= self.max_viewers {
            return Err(Error::CapacityExceeded {
                max: self.max_viewers,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        inner.viewers.insert(id, Viewer { tx, paused: false });
        inner.active += 1;
        if inner.active == 1 {
            self.send_camera(CameraCommand::Resume);
        }

        tracing::info!(
            viewer_id = id,
            viewers = inner.viewers.len(),
            active = inner.active,
            "Viewer registered"
        );

        Ok(id)
    }

    /// Remove a viewer, releasing its activation contribution
    ///
    /// Idempotent: a viewer already removed (for example by a failed
    /// delivery racing its disconnect) is ignored. The 1→0 activation
    /// transition pauses the camera.
    pub async fn unregister(&self, id: ViewerId) {
        let mut inner = self.inner.write().await;

        if !self.remove_locked(&mut inner, id) {
            return;
        }

        tracing::info!(
            viewer_id = id,
            viewers = inner.viewers.len(),
            active = inner.active,
            "Viewer unregistered"
        );
    }

    /// Remove a viewer under an already-held write lock
    ///
    /// Returns false if the viewer was not registered.
    fn remove_locked(&self, inner: &mut Inner, id: ViewerId) -> bool {
        let Some(viewer) = inner.viewers.remove(&id) else {
            return false;
        };

        if !viewer.paused {
            inner.active -= 1;
            if inner.active == 0 {
                self.send_camera(CameraCommand::Pause);
            }
        }

        true
    }

    /// Toggle one viewer's contribution to the activation counter
    ///
    /// Idempotent when the viewer is already in the requested state.
    /// Pausing one viewer never affects delivery to the others.
    pub async fn set_paused(&self, id: ViewerId, paused: bool) {
        let mut inner = self.inner.write().await;

        let Some(viewer) = inner.viewers.get_mut(&id) else {
            return;
        };
        if viewer.paused == paused {
            return;
        }
        viewer.paused = paused;

        if paused {
            inner.active -= 1;
            if inner.active == 0 {
                self.send_camera(CameraCommand::Pause);
            }
        } else {
            inner.active += 1;
            if inner.active == 1 {
                self.send_camera(CameraCommand::Resume);
            }
        }

        tracing::debug!(viewer_id = id, paused = paused, active = inner.active, "Viewer pause state");
    }

    /// Deliver one stream unit to every registered, unpaused viewer
    ///
    /// Frames are chunked once into wire packets; control signals go out as
    /// single bytes. Delivery is in emission order per viewer, and the lock
    /// is held exclusively across the fan-out: a frame's chunk sequence
    /// lands in each queue as one uninterrupted run even when another task
    /// broadcasts a control signal at the same time. A viewer whose queue
    /// is gone is unregistered exactly once; nothing is retried and no
    /// history is kept for late joiners.
    pub async fn broadcast(&self, unit: &StreamUnit) {
        let chunks = match unit {
            StreamUnit::Control(signal) => vec![Bytes::copy_from_slice(&[signal.as_byte()])],
            StreamUnit::Frame(blob) => {
                tracing::trace!(len = blob.data.len(), kind = ?blob.kind, "Broadcasting frame");
                chunk_frame(&blob.data)
            }
        };

        let mut inner = self.inner.write().await;

        let mut dead = Vec::new();
        for (id, viewer) in inner.viewers.iter() {
            if viewer.paused {
                continue;
            }
            for chunk in &chunks {
                if viewer.tx.send(chunk.clone()).is_err() {
                    dead.push(*id);
                    break;
                }
            }
        }

        for id in dead {
            tracing::debug!(viewer_id = id, "Dropping viewer with closed queue");
            self.remove_locked(&mut inner, id);
        }
    }

    /// Forward a command to the camera link
    ///
    /// Infallible from the registry's point of view: if the link is gone the
    /// whole relay is coming down anyway.
    pub(crate) fn send_camera(&self, cmd: CameraCommand) {
        tracing::debug!(command = cmd.as_str(), "Camera command");
        let _ = self.camera_tx.send(cmd);
    }

    /// Number of registered viewers
    pub async fn viewer_count(&self) -> usize {
        self.inner.read().await.viewers.len()
    }

    /// Number of registered, unpaused viewers
    pub async fn active_count(&self) -> usize {
        self.inner.read().await.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::segment::{FrameBlob, FrameKind};
    use crate::protocol::{ControlSignal, MAX_PACKET_SIZE};

    fn registry(max: usize) -> (ViewerRegistry, mpsc::UnboundedReceiver<CameraCommand>) {
        let (camera_tx, camera_rx) = mpsc::unbounded_channel();
        (ViewerRegistry::new(max, camera_tx), camera_rx)
    }

    fn viewer_queue() -> (mpsc::UnboundedSender<Bytes>, mpsc::UnboundedReceiver<Bytes>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_first_viewer_resumes_camera() {
        let (registry, mut camera) = registry(10);

        let (tx, _rx) = viewer_queue();
        registry.register(tx).await.unwrap();

        assert_eq!(camera.recv().await, Some(CameraCommand::Resume));
        assert_eq!(registry.active_count().await, 1);

        // Second viewer must not resume again
        let (tx2, _rx2) = viewer_queue();
        registry.register(tx2).await.unwrap();
        assert!(camera.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_last_viewer_pauses_camera() {
        let (registry, mut camera) = registry(10);

        let (tx, _rx) = viewer_queue();
        let a = registry.register(tx).await.unwrap();
        let (tx2, _rx2) = viewer_queue();
        let b = registry.register(tx2).await.unwrap();
        assert_eq!(camera.recv().await, Some(CameraCommand::Resume));

        registry.unregister(a).await;
        assert!(camera.try_recv().is_err());

        registry.unregister(b).await;
        assert_eq!(camera.recv().await, Some(CameraCommand::Pause));
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_pause_resume_transitions() {
        let (registry, mut camera) = registry(10);

        let (tx, _rx) = viewer_queue();
        let id = registry.register(tx).await.unwrap();
        assert_eq!(camera.recv().await, Some(CameraCommand::Resume));

        registry.set_paused(id, true).await;
        assert_eq!(camera.recv().await, Some(CameraCommand::Pause));
        assert_eq!(registry.active_count().await, 0);
        assert_eq!(registry.viewer_count().await, 1);

        // Idempotent: pausing again emits nothing
        registry.set_paused(id, true).await;
        assert!(camera.try_recv().is_err());

        registry.set_paused(id, false).await;
        assert_eq!(camera.recv().await, Some(CameraCommand::Resume));
    }

    #[tokio::test]
    async fn test_unregister_paused_viewer_no_transition() {
        let (registry, mut camera) = registry(10);

        let (tx, _rx) = viewer_queue();
        let id = registry.register(tx).await.unwrap();
        camera.recv().await.unwrap();

        registry.set_paused(id, true).await;
        assert_eq!(camera.recv().await, Some(CameraCommand::Pause));

        // Already paused: removal releases nothing further
        registry.unregister(id).await;
        assert!(camera.try_recv().is_err());
        assert_eq!(registry.viewer_count().await, 0);
    }

    #[tokio::test]
    async fn test_capacity_rejected() {
        let (registry, _camera) = registry(2);

        let (tx, _a) = viewer_queue();
        registry.register(tx).await.unwrap();
        let (tx, _b) = viewer_queue();
        registry.register(tx).await.unwrap();

        let (tx, _c) = viewer_queue();
        let result = registry.register(tx).await;
        assert!(matches!(result, Err(Error::CapacityExceeded { max: 2 })));
        assert_eq!(registry.viewer_count().await, 2);
    }

    #[tokio::test]
    async fn test_broadcast_skips_paused() {
        let (registry, _camera) = registry(10);

        let (tx, mut live_rx) = viewer_queue();
        let _live = registry.register(tx).await.unwrap();
        let (tx, mut paused_rx) = viewer_queue();
        let paused = registry.register(tx).await.unwrap();
        registry.set_paused(paused, true).await;

        let unit = StreamUnit::Control(ControlSignal::CameraInUse);
        registry.broadcast(&unit).await;

        assert_eq!(&live_rx.recv().await.unwrap()[..], &[0x33]);
        assert!(paused_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_chunks_large_frame() {
        let (registry, _camera) = registry(10);

        let (tx, mut rx) = viewer_queue();
        registry.register(tx).await.unwrap();

        let data = Bytes::from(vec![5u8; MAX_PACKET_SIZE + 100]);
        let unit = StreamUnit::Frame(FrameBlob {
            data,
            kind: FrameKind::Capture,
        });
        registry.broadcast(&unit).await;

        assert_eq!(rx.recv().await.unwrap().len(), MAX_PACKET_SIZE);
        assert_eq!(rx.recv().await.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_dead_viewer_removed_once() {
        let (registry, mut camera) = registry(10);

        let (tx, rx) = viewer_queue();
        registry.register(tx).await.unwrap();
        camera.recv().await.unwrap();
        drop(rx);

        let unit = StreamUnit::Control(ControlSignal::CameraInUse);
        registry.broadcast(&unit).await;

        assert_eq!(registry.viewer_count().await, 0);
        // Releasing the last viewer pauses the camera, exactly once
        assert_eq!(camera.recv().await, Some(CameraCommand::Pause));
        assert!(camera.try_recv().is_err());

        // A second broadcast is a no-op, not a double removal
        registry.broadcast(&unit).await;
        assert!(camera.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_order_per_viewer() {
        let (registry, _camera) = registry(10);

        let (tx, mut rx) = viewer_queue();
        registry.register(tx).await.unwrap();

        for i in 0..5u8 {
            let unit = StreamUnit::Frame(FrameBlob {
                data: Bytes::from(vec![i; 10]),
                kind: FrameKind::Live,
            });
            registry.broadcast(&unit).await;
        }

        for i in 0..5u8 {
            assert_eq!(rx.recv().await.unwrap()[0], i);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_broadcasts_do_not_splice_frames() {
        let (registry, _camera) = registry(10);
        let registry = std::sync::Arc::new(registry);

        let (tx, mut rx) = viewer_queue();
        registry.register(tx).await.unwrap();

        // One task streams three-chunk frames while another fires control
        // signals; no signal may land inside a frame's chunk sequence
        let frames = {
            let registry = std::sync::Arc::clone(&registry);
            tokio::spawn(async move {
                let data = Bytes::from(vec![7u8; MAX_PACKET_SIZE * 2 + 64]);
                for _ in 0..200 {
                    let unit = StreamUnit::Frame(FrameBlob {
                        data: data.clone(),
                        kind: FrameKind::Live,
                    });
                    registry.broadcast(&unit).await;
                }
            })
        };
        let signals = {
            let registry = std::sync::Arc::clone(&registry);
            tokio::spawn(async move {
                for _ in 0..200 {
                    let unit = StreamUnit::Control(ControlSignal::CameraInUse);
                    registry.broadcast(&unit).await;
                }
            })
        };
        frames.await.unwrap();
        signals.await.unwrap();

        // Replay the queue: after a full chunk, only another full chunk or
        // the 64-byte tail may follow
        let mut mid_frame = false;
        while let Ok(msg) = rx.try_recv() {
            if msg.len() == MAX_PACKET_SIZE {
                mid_frame = true;
            } else if mid_frame {
                assert_eq!(msg.len(), 64, "message spliced into a frame");
                mid_frame = false;
            }
        }
        assert!(!mid_frame, "stream ended mid-frame");
    }
}
