//! Silent authorization in a background frame
//!
//! The authorize URL is loaded in a hidden frame. When the user already has
//! a session with the authorization server, the server redirects straight
//! back to the client with a code and the frame's location carries the
//! response. The attempt is bounded by a timeout, and the frame is torn
//! down exactly once whether it loaded or timed out.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{PassportError, Result};
use crate::platform::{Frame, FrameHost};

/// How a silent attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame signalled a load; holds its query without the leading `?`,
    /// empty when the location was unreadable
    Loaded(String),
    /// No load signal arrived in time
    TimedOut,
}

/// Detaches a frame on first use or on drop, never twice
struct Teardown {
    frame: Option<Box<dyn Frame>>,
}

impl Teardown {
    fn new(frame: Box<dyn Frame>) -> Self {
        Self { frame: Some(frame) }
    }

    fn frame(&mut self) -> Option<&mut Box<dyn Frame>> {
        self.frame.as_mut()
    }

    fn run(&mut self) {
        if let Some(mut frame) = self.frame.take() {
            if let Err(e) = frame.detach() {
                // Already removed by someone else; nothing left to clean up.
                tracing::debug!("Ignoring frame detach failure: {}", e);
            }
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.run();
    }
}

/// Runs authorize requests through a [`FrameHost`]
#[derive(Clone)]
pub struct SilentTransport {
    frames: Arc<dyn FrameHost>,
}

impl SilentTransport {
    /// Create a transport over `frames`
    pub fn new(frames: Arc<dyn FrameHost>) -> Self {
        Self { frames }
    }

    /// Load `url` in a background frame and report how the attempt ended
    ///
    /// # Errors
    ///
    /// Returns error only if the frame cannot be attached
    pub async fn attempt(&self, url: &str, timeout: Duration) -> Result<FrameOutcome> {
        let frame = self.frames.attach(url).await?;
        let mut teardown = Teardown::new(frame);

        let outcome = match teardown.frame() {
            Some(frame) => {
                tokio::select! {
                    Some(_) = frame.next_event() => {
                        let query = frame.query().unwrap_or_default();
                        let query = query.strip_prefix('?').unwrap_or(&query).to_string();
                        FrameOutcome::Loaded(query)
                    }
                    _ = tokio::time::sleep(timeout) => FrameOutcome::TimedOut,
                }
            }
            None => FrameOutcome::TimedOut,
        };

        teardown.run();
        Ok(outcome)
    }

    /// Load `url` silently and return the response query without `?`
    ///
    /// # Errors
    ///
    /// Returns [`PassportError::Timeout`] when no load signal arrives
    /// within `timeout`, or the attach error
    pub async fn run(&self, url: &str, timeout: Duration) -> Result<String> {
        match self.attempt(url, timeout).await? {
            FrameOutcome::Loaded(query) => Ok(query),
            FrameOutcome::TimedOut => Err(PassportError::Timeout(timeout.as_secs()).into()),
        }
    }
}

impl std::fmt::Debug for SilentTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SilentTransport").finish_non_exhaustive()
    }
}
