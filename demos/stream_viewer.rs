//! Viewer example: watch the live stream and take one photo
//!
//! Run with: cargo run --example stream_viewer [URL]
//!
//!   cargo run --example stream_viewer                      # ws://127.0.0.1:9998/
//!   cargo run --example stream_viewer ws://host:9998/
//!
//! Frames are not drawn anywhere; the sink just reports sizes. After a few
//! seconds the viewer requests a high-resolution photo and writes it to
//! `photo.jpg`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use camrelay::client::{ClientConfig, FrameSink, StreamClient, ViewerEvent};

/// Counts frames instead of drawing them
struct ConsoleSink {
    frames: AtomicUsize,
}

impl FrameSink for ConsoleSink {
    fn render_frame(&self, jpeg: &Bytes) {
        let n = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if n % 30 == 0 {
            println!("{} frames received, last {} bytes", n, jpeg.len());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camrelay=debug".parse()?),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9998/".to_string());

    let sink = Arc::new(ConsoleSink {
        frames: AtomicUsize::new(0),
    });
    let config = ClientConfig::new(&url);
    let (client, mut events) =
        StreamClient::connect(config, vec![sink as Arc<dyn FrameSink>]).await?;
    println!("Watching {}", url);

    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ViewerEvent::CameraInUse => println!("Camera busy: capture in progress"),
                ViewerEvent::FullImageIncoming => println!("High-res image incoming"),
                ViewerEvent::CaptureResult(blob) => {
                    println!("Capture result: {} bytes", blob.len())
                }
                ViewerEvent::Disconnected => {
                    println!("Relay connection closed");
                    break;
                }
                ViewerEvent::LiveFrame(_) => {}
            }
        }
    });

    // Watch the live stream for a bit, then ask for a photo
    tokio::time::sleep(Duration::from_secs(5)).await;
    println!("Taking a photo...");
    let photo = client.photograph().await?;
    tokio::fs::write("photo.jpg", &photo).await?;
    println!("Saved photo.jpg ({} bytes)", photo.len());

    event_task.await?;
    Ok(())
}
