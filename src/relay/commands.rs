//! Routing of inbound viewer commands
//!
//! Viewers send UTF-8 text frames from a closed command set. `capture`
//! reaches the camera and announces itself to every other viewer;
//! `pause`/`resume` only change the issuing viewer's state. Anything else
//! is ignored without error.

use std::sync::Arc;

use crate::protocol::{CameraCommand, ControlSignal, ViewerCommand};
use crate::segment::StreamUnit;

use super::registry::{ViewerId, ViewerRegistry};

/// Maps a viewer's text commands to registry and camera actions
pub struct CommandRouter {
    registry: Arc<ViewerRegistry>,
}

impl CommandRouter {
    /// Create a router over the shared registry
    pub fn new(registry: Arc<ViewerRegistry>) -> Self {
        Self { registry }
    }

    /// Handle one inbound text frame from `viewer`
    pub async fn route(&self, viewer: ViewerId, text: &str) {
        let Some(command) = ViewerCommand::parse(text) else {
            tracing::debug!(viewer_id = viewer, text = text, "Ignoring unrecognized command");
            return;
        };

        tracing::debug!(viewer_id = viewer, command = command.as_str(), "Viewer command");

        match command {
            ViewerCommand::Capture => {
                self.registry.send_camera(CameraCommand::Capture);
                // Tell every viewer a high-res capture is in flight so they
                // can suppress rendering until the result lands
                self.registry
                    .broadcast(&StreamUnit::Control(ControlSignal::CameraInUse))
                    .await;
            }
            ViewerCommand::Pause => {
                self.registry.set_paused(viewer, true).await;
            }
            ViewerCommand::Resume => {
                self.registry.set_paused(viewer, false).await;
            }
        }
    }
}
