//! Coalescing of concurrent photograph requests
//!
//! Any number of callers may ask for a photo before the camera answers; the
//! tracker keeps them in arrival order and guarantees at most one `capture`
//! command is outstanding. When the result arrives, every waiting caller
//! gets the same blob and the queue resets in one step.

use bytes::Bytes;
use tokio::sync::oneshot;

/// Queue of callers awaiting the next capture result
pub struct PhotoRequestTracker {
    pending: Vec<oneshot::Sender<Bytes>>,
    outstanding: bool,
}

impl PhotoRequestTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            outstanding: false,
        }
    }

    /// Queue one caller; returns true when a `capture` command must be sent
    ///
    /// Only the call that transitions the tracker from idle to outstanding
    /// gets `true`; everyone else shares that request.
    pub fn enqueue(&mut self, done: oneshot::Sender<Bytes>) -> bool {
        self.pending.push(done);
        if self.outstanding {
            false
        } else {
            self.outstanding = true;
            true
        }
    }

    /// Resolve every queued caller with the same result and reset
    ///
    /// Returns how many callers were resolved. A result with no one waiting
    /// (another viewer's capture) resolves nothing.
    pub fn resolve(&mut self, blob: &Bytes) -> usize {
        let waiting = std::mem::take(&mut self.pending);
        self.outstanding = false;

        let mut resolved = 0;
        for done in waiting {
            // A caller that gave up on its receiver is fine to skip
            if done.send(blob.clone()).is_ok() {
                resolved += 1;
            }
        }
        resolved
    }

    /// Whether a capture command is currently outstanding
    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    /// Number of callers waiting for the next result
    pub fn waiting(&self) -> usize {
        self.pending.len()
    }
}

impl Default for PhotoRequestTracker {
    fn default() -> Self {
        Self::new()
    }
}
