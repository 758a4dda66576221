//! Tracks metadata for a rendering session.

use crate::log;

/// Metadata for a rendering session.
///
/// A session is created along with a top-level [`RenderContext`] and is shared with every
/// sub-context that it spawns for tiles, clips and masks, so that all of them log
/// consistently.
///
/// [`RenderContext`]: crate::render_ctx::RenderContext
#[derive(Clone, Debug)]
pub struct Session {
    log_enabled: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            log_enabled: log::log_enabled(),
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a session that logs regardless of the environment.
    pub fn new_for_test_suite() -> Self {
        Self { log_enabled: true }
    }

    pub fn log_enabled(&self) -> bool {
        self.log_enabled
    }
}
