//! Upstream link to the camera capture process
//!
//! The capture process is an external program that serves the raw JPEG
//! packet stream on a local TCP port and accepts ASCII commands on the same
//! connection. [`CameraLink`] owns that single connection, forwards inbound
//! chunks to the relay, and writes outbound [`CameraCommand`]s.
//!
//! Connection failures are handled entirely here: the link retries with a
//! fixed delay between attempts, forever. Nothing is surfaced to viewers;
//! from their side the stream simply goes quiet until the camera is back.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::protocol::{CameraCommand, MAX_PACKET_SIZE};

/// Capacity of the camera-to-relay chunk channel
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Owns the TCP connection to the capture process
///
/// Construct with [`CameraLink::new`], then drive it with [`run`] as a
/// spawned task. Raw chunks arrive on the returned receiver in arrival
/// order; commands are accepted on the channel passed to `run`.
///
/// [`run`]: CameraLink::run
pub struct CameraLink {
    addr: SocketAddr,
    reconnect_delay: Duration,
    chunk_tx: mpsc::Sender<Bytes>,
}

impl CameraLink {
    /// Create a link to the capture process at `addr`
    ///
    /// Returns the link and the receiver for raw stream chunks.
    pub fn new(addr: SocketAddr, reconnect_delay: Duration) -> (Self, mpsc::Receiver<Bytes>) {
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

        let link = Self {
            addr,
            reconnect_delay,
            chunk_tx,
        };

        (link, chunk_rx)
    }

    /// Run the connect/read/write loop until the relay side is dropped
    ///
    /// Reconnects after `reconnect_delay` on any connect or I/O failure.
    /// One-shot commands that arrive while disconnected are dropped with a
    /// log notice, but the last pause/resume is remembered and written to
    /// every fresh connection, so an activation transition during an outage
    /// still reaches the capture process.
    pub async fn run(self, mut cmd_rx: mpsc::UnboundedReceiver<CameraCommand>) {
        // Last pause/resume seen on the command channel
        let mut activation: Option<CameraCommand> = None;

        loop {
            // One-shot commands queued during an outage are stale by now;
            // activation state is not
            while let Ok(cmd) = cmd_rx.try_recv() {
                match cmd {
                    CameraCommand::Pause | CameraCommand::Resume => {
                        tracing::info!(command = cmd.as_str(), "Camera offline, deferring command");
                        activation = Some(cmd);
                    }
                    cmd => {
                        tracing::info!(command = cmd.as_str(), "Camera offline, dropping command");
                    }
                }
            }

            let mut stream = match TcpStream::connect(self.addr).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::info!(addr = %self.addr, error = %e, "Camera connect failed, retrying");
                    tokio::time::sleep(self.reconnect_delay).await;
                    continue;
                }
            };

            tracing::info!(addr = %self.addr, "Camera connected");

            if let Some(cmd) = &activation {
                tracing::debug!(command = cmd.as_str(), "Restoring activation state");
                if stream.write_all(cmd.as_str().as_bytes()).await.is_err() {
                    tokio::time::sleep(self.reconnect_delay).await;
                    continue;
                }
            }

            if self.serve(stream, &mut cmd_rx, &mut activation).await.is_err() {
                // Relay side hung up; nothing left to feed
                return;
            }

            tracing::info!(addr = %self.addr, "Camera connection lost, reconnecting");
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// Pump one live connection; returns Err only when the relay is gone
    async fn serve(
        &self,
        mut stream: TcpStream,
        cmd_rx: &mut mpsc::UnboundedReceiver<CameraCommand>,
        activation: &mut Option<CameraCommand>,
    ) -> Result<(), ()> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                read = stream.read(&mut buf) => {
                    match read {
                        Ok(0) => return Ok(()),
                        Ok(n) => {
                            let chunk = Bytes::copy_from_slice(&buf[..n]);
                            if self.chunk_tx.send(chunk).await.is_err() {
                                return Err(());
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "Camera read error");
                            return Ok(());
                        }
                    }
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if matches!(cmd, CameraCommand::Pause | CameraCommand::Resume) {
                                *activation = Some(cmd);
                            }
                            tracing::debug!(command = cmd.as_str(), "Sending camera command");
                            if let Err(e) = stream.write_all(cmd.as_str().as_bytes()).await {
                                tracing::debug!(error = %e, "Camera write error");
                                return Ok(());
                            }
                        }
                        // Command side closed: relay is shutting down
                        None => return Err(()),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    async fn bind_local() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_chunks_forwarded_in_order() {
        let (listener, addr) = bind_local().await;

        let (link, mut chunks) = CameraLink::new(addr, Duration::from_millis(10));
        let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(link.run(cmd_rx));

        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(&[1, 2, 3]).await.unwrap();
        socket.flush().await.unwrap();

        let chunk = chunks.recv().await.unwrap();
        assert_eq!(&chunk[..], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_commands_written_as_ascii() {
        let (listener, addr) = bind_local().await;

        let (link, _chunks) = CameraLink::new(addr, Duration::from_millis(10));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(link.run(cmd_rx));

        let (mut socket, _) = listener.accept().await.unwrap();
        cmd_tx.send(CameraCommand::Resume).unwrap();

        let mut buf = [0u8; 16];
        let n = socket.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"resume");
    }

    #[tokio::test]
    async fn test_reconnects_after_disconnect() {
        let (listener, addr) = bind_local().await;

        let (link, mut chunks) = CameraLink::new(addr, Duration::from_millis(10));
        let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(link.run(cmd_rx));

        // First connection sends one chunk and dies
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(&[9]).await.unwrap();
        drop(socket);
        assert_eq!(&chunks.recv().await.unwrap()[..], &[9]);

        // Link comes back on its own after the retry delay
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(&[7, 7]).await.unwrap();
        assert_eq!(&chunks.recv().await.unwrap()[..], &[7, 7]);
    }

    #[tokio::test]
    async fn test_activation_survives_outage() {
        // Reserve a port but leave it closed while the commands arrive
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let (link, _chunks) = CameraLink::new(addr, Duration::from_millis(10));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(link.run(cmd_rx));

        // A capture during the outage is stale, but the resume is state
        cmd_tx.send(CameraCommand::Capture).unwrap();
        cmd_tx.send(CameraCommand::Resume).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let listener = TcpListener::bind(addr).await.unwrap();
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buf = [0u8; 16];
        let n = socket.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"resume");

        // The state is written again on every reconnect
        drop(socket);
        let (mut socket, _) = listener.accept().await.unwrap();
        let n = socket.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"resume");
    }
}
