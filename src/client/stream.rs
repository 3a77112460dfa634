//! High-level viewer client
//!
//! Connects to the relay, negotiates the `jpeg-meta` subprotocol, and turns
//! the wire stream into rendered frames, resolved photo requests, and
//! events. Rendering itself stays behind the [`FrameSink`] trait; the
//! embedding application decides what a "canvas" is.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};
use crate::protocol::{ControlSignal, ViewerCommand, SUBPROTOCOL};

use super::config::ClientConfig;
use super::decoder::{DecodedUnit, FrameDecoder};
use super::photo::PhotoRequestTracker;

/// A surface live frames are rendered to
///
/// One connection can feed any number of sinks; each gets every live frame
/// while the client is not paused. Capture results bypass sinks and resolve
/// [`StreamClient::photograph`] callers instead.
pub trait FrameSink: Send + Sync {
    /// Draw one complete JPEG image
    fn render_frame(&self, jpeg: &Bytes);
}

/// Events from the viewer connection
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    /// A live frame arrived (also rendered to sinks unless paused)
    LiveFrame(Bytes),

    /// A capture result arrived (also resolves queued photograph calls)
    CaptureResult(Bytes),

    /// Some viewer triggered a capture; rendering may stutter briefly
    CameraInUse,

    /// The relay announced a high-resolution image is on its way
    FullImageIncoming,

    /// The connection to the relay is gone
    Disconnected,
}

struct Shared {
    photos: Mutex<PhotoRequestTracker>,
    paused: AtomicBool,
}

/// Viewer connection to a relay
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use camrelay::client::{ClientConfig, FrameSink, StreamClient};
///
/// struct Null;
/// impl FrameSink for Null {
///     fn render_frame(&self, _jpeg: &bytes::Bytes) {}
/// }
///
/// # async fn example() -> camrelay::error::Result<()> {
/// let config = ClientConfig::new("ws://127.0.0.1:9998/");
/// let (client, mut events) = StreamClient::connect(config, vec![Arc::new(Null)]).await?;
///
/// let photo = client.photograph();
/// let jpeg = photo.await.ok();
/// # let _ = (jpeg, events.recv().await);
/// # Ok(())
/// # }
/// ```
pub struct StreamClient {
    cmd_tx: mpsc::UnboundedSender<Message>,
    shared: Arc<Shared>,
}

impl StreamClient {
    /// Connect to the relay and start decoding
    ///
    /// Returns the client handle and the event receiver. Fails fast with a
    /// setup error when the configuration is unusable or no render sink was
    /// supplied; transport errors are reported as such.
    pub async fn connect(
        config: ClientConfig,
        sinks: Vec<Arc<dyn FrameSink>>,
    ) -> Result<(Self, mpsc::Receiver<ViewerEvent>)> {
        config.validate()?;
        if sinks.is_empty() {
            return Err(Error::Setup("no render sinks attached".into()));
        }

        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Setup(format!("bad relay URL: {}", e)))?;
        request.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            SUBPROTOCOL.parse().expect("static header"),
        );

        let (ws, _response) = connect_async(request).await?;
        tracing::info!(url = %config.url, "Connected to relay");
        let (mut sink, mut stream) = ws.split();

        let shared = Arc::new(Shared {
            photos: Mutex::new(PhotoRequestTracker::new()),
            paused: AtomicBool::new(false),
        });

        // Writer task: commands out
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(msg) = cmd_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // Reader task: wire messages in, frames and events out
        let (event_tx, event_rx) = mpsc::channel(256);
        let reader_shared = Arc::clone(&shared);
        let threshold = config.high_res_threshold;
        tokio::spawn(async move {
            let mut decoder = FrameDecoder::with_threshold(threshold);

            while let Some(msg) = stream.next().await {
                let payload = match msg {
                    Ok(Message::Binary(data)) => Bytes::from(data),
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };

                let Some(unit) = decoder.push(payload) else {
                    continue;
                };

                let event = match unit {
                    DecodedUnit::Control(ControlSignal::CameraInUse) => ViewerEvent::CameraInUse,
                    DecodedUnit::Control(ControlSignal::FullImageIncoming) => {
                        ViewerEvent::FullImageIncoming
                    }
                    DecodedUnit::LiveFrame(blob) => {
                        if !reader_shared.paused.load(Ordering::Relaxed) {
                            for sink in &sinks {
                                sink.render_frame(&blob);
                            }
                        }
                        ViewerEvent::LiveFrame(blob)
                    }
                    DecodedUnit::CaptureResult(blob) => {
                        let resolved = reader_shared
                            .photos
                            .lock()
                            .expect("photo tracker lock")
                            .resolve(&blob);
                        tracing::debug!(len = blob.len(), resolved, "Capture result");
                        ViewerEvent::CaptureResult(blob)
                    }
                };

                // An absent or stalled event consumer must never stall
                // decoding and rendering
                if let Err(e) = event_tx.try_send(event) {
                    tracing::debug!(error = %e, "Event dropped");
                }
            }

            let _ = event_tx.try_send(ViewerEvent::Disconnected);
        });

        Ok((
            Self { cmd_tx, shared },
            event_rx,
        ))
    }

    /// Request a one-shot high-resolution photo
    ///
    /// Any number of concurrent calls share a single `capture` command; all
    /// of them resolve with the identical image when it arrives. The
    /// returned channel errors if the connection dies first.
    pub fn photograph(&self) -> oneshot::Receiver<Bytes> {
        let (tx, rx) = oneshot::channel();

        let send_capture = self
            .shared
            .photos
            .lock()
            .expect("photo tracker lock")
            .enqueue(tx);

        if send_capture {
            self.send_command(ViewerCommand::Capture);
        }

        rx
    }

    /// Stop receiving live frames
    ///
    /// Idempotent; the `pause` command goes out once per transition. While
    /// paused, live frames are neither delivered nor rendered, and the
    /// relay may power the camera down if no other viewer is watching.
    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::Relaxed) {
            self.send_command(ViewerCommand::Pause);
        }
    }

    /// Resume receiving live frames; idempotent like [`pause`](Self::pause)
    pub fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::Relaxed) {
            self.send_command(ViewerCommand::Resume);
        }
    }

    /// Whether this viewer is currently paused
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    fn send_command(&self, command: ViewerCommand) {
        let _ = self
            .cmd_tx
            .send(Message::Text(command.as_str().to_string()));
    }
}
