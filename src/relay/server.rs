//! WebSocket relay server
//!
//! Accepts viewer connections, negotiates the `jpeg-meta` subprotocol, and
//! wires the three long-lived tasks together: the camera link, the pump
//! that segments camera chunks and broadcasts them, and one writer task per
//! viewer draining that viewer's queue into its socket.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::camera::CameraLink;
use crate::error::{Error, Result};
use crate::protocol::{CameraCommand, SUBPROTOCOL};
use crate::segment::FrameSegmenter;

use super::commands::CommandRouter;
use super::config::RelayConfig;
use super::registry::ViewerRegistry;

/// JPEG stream relay server
///
/// One upstream camera, any number of downstream viewers. Construct with
/// [`RelayServer::new`] and drive with [`run`] or [`run_until`].
///
/// [`run`]: RelayServer::run
/// [`run_until`]: RelayServer::run_until
pub struct RelayServer {
    config: RelayConfig,
    registry: Arc<ViewerRegistry>,
    router: Arc<CommandRouter>,
    camera_tx: mpsc::UnboundedSender<CameraCommand>,
    camera_rx: Mutex<Option<mpsc::UnboundedReceiver<CameraCommand>>>,
}

impl RelayServer {
    /// Create a new relay with the given configuration
    pub fn new(config: RelayConfig) -> Self {
        let (camera_tx, camera_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(ViewerRegistry::new(config.max_viewers, camera_tx.clone()));
        let router = Arc::new(CommandRouter::new(Arc::clone(&registry)));

        Self {
            config,
            registry,
            router,
            camera_tx,
            camera_rx: Mutex::new(Some(camera_rx)),
        }
    }

    /// Get a reference to the viewer registry
    pub fn registry(&self) -> &Arc<ViewerRegistry> {
        &self.registry
    }

    /// Ask the capture process to terminate
    pub fn shutdown_camera(&self) {
        let _ = self.camera_tx.send(CameraCommand::Shutdown);
    }

    /// Run the relay
    ///
    /// Binds the WebSocket endpoint, starts the camera link and pump, then
    /// accepts viewers until the task is dropped. A `RelayServer` drives
    /// one camera link for its lifetime: a second `run` call on the same
    /// instance fails with a setup error.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Relay listening");

        self.start_camera().await?;
        self.accept_loop(&listener).await
    }

    /// Run the relay with graceful shutdown
    ///
    /// Single-use, like [`run`](RelayServer::run).
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Relay listening");

        self.start_camera().await?;

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    /// Spawn the camera link and the segment-and-broadcast pump
    async fn start_camera(&self) -> Result<()> {
        let Some(camera_rx) = self.camera_rx.lock().await.take() else {
            return Err(Error::Setup("relay already started".into()));
        };

        let (link, chunk_rx) = CameraLink::new(self.config.camera_addr, self.config.reconnect_delay);
        tokio::spawn(link.run(camera_rx));

        let registry = Arc::clone(&self.registry);
        let threshold = self.config.high_res_threshold;
        tokio::spawn(pump(chunk_rx, registry, threshold));

        Ok(())
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    tracing::debug!(peer = %peer_addr, "New viewer connection");

                    let registry = Arc::clone(&self.registry);
                    let router = Arc::clone(&self.router);
                    tokio::spawn(async move {
                        if let Err(e) = handle_viewer(socket, registry, router).await {
                            tracing::debug!(peer = %peer_addr, error = %e, "Viewer connection ended");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Feed camera chunks through the segmenter and fan units out to viewers
async fn pump(
    mut chunks: mpsc::Receiver<Bytes>,
    registry: Arc<ViewerRegistry>,
    threshold: usize,
) {
    let mut segmenter = FrameSegmenter::with_threshold(threshold);

    while let Some(chunk) = chunks.recv().await {
        if let Some(unit) = segmenter.push(chunk) {
            registry.broadcast(&unit).await;
        }
    }

    tracing::debug!("Camera chunk stream ended");
}

/// Negotiate the `jpeg-meta` subprotocol during the WebSocket handshake
fn negotiate_subprotocol(
    request: &Request,
    mut response: Response,
) -> std::result::Result<Response, ErrorResponse> {
    let offered = request
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|p| p.trim() == SUBPROTOCOL))
        .unwrap_or(false);

    if offered {
        response
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, SUBPROTOCOL.parse().expect("static header"));
    }

    Ok(response)
}

/// Serve one viewer for the lifetime of its connection
async fn handle_viewer(
    socket: TcpStream,
    registry: Arc<ViewerRegistry>,
    router: Arc<CommandRouter>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_hdr_async(socket, negotiate_subprotocol).await?;
    let (mut sink, mut stream) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let viewer_id = match registry.register(tx).await {
        Ok(id) => id,
        Err(e @ Error::CapacityExceeded { .. }) => {
            // Explicit rejection: close with a reason instead of silently
            // keeping a muted connection around
            tracing::info!("Refusing viewer: {}", e);
            let frame = CloseFrame {
                code: CloseCode::Again,
                reason: "viewer limit reached".into(),
            };
            let _ = sink.send(Message::Close(Some(frame))).await;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    // Writer task: drain this viewer's queue into the socket. The queue
    // sender lives only in the registry, so unregistering ends this task.
    let writer = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            if sink.send(Message::binary(chunk.to_vec())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Read loop: text frames are commands, everything else is noise
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => router.route(viewer_id, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(viewer_id, error = %e, "Viewer read error");
                break;
            }
        }
    }

    // Disconnect releases the viewer's activation contribution immediately
    registry.unregister(viewer_id).await;
    writer.abort();

    Ok(())
}
