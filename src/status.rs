//! Caller-facing status badge.
//!
//! Shows the loop status until the first feedback message arrives, then the
//! feedback from then on. A failure clears the feedback so the error is
//! visible.

use std::sync::{Arc, Mutex};

pub const STATUS_LOADING: &str = "Loading models.";
pub const STATUS_REQUESTING_CAMERA: &str = "Requesting camera.";
pub const STATUS_DETECTING: &str = "Detecting.";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: String,
    pub feedback: Option<String>,
    /// Bumped on every change.
    pub revision: u64,
}

impl StatusSnapshot {
    pub fn display_text(&self) -> &str {
        self.feedback.as_deref().unwrap_or(&self.status)
    }
}

#[derive(Clone, Debug, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<StatusSnapshot>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, apply: impl FnOnce(&mut StatusSnapshot)) {
        let mut snapshot = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        apply(&mut snapshot);
        snapshot.revision += 1;
    }

    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        log::info!("status: {}", status);
        self.update(|s| s.status = status);
    }

    pub fn set_feedback(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.feedback = Some(message));
    }

    /// New run: status text, no feedback yet.
    pub fn reset(&self, status: impl Into<String>) {
        let status = status.into();
        log::info!("status: {}", status);
        self.update(|s| {
            s.status = status;
            s.feedback = None;
        });
    }

    pub fn set_error(&self, reason: impl std::fmt::Display) {
        let status = format!("Error: {reason}");
        log::error!("status: {}", status);
        self.update(|s| {
            s.status = status;
            s.feedback = None;
        });
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn display_text(&self) -> String {
        self.snapshot().display_text().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_shows_until_first_feedback() {
        let board = StatusBoard::new();
        board.reset(STATUS_LOADING);
        assert_eq!(board.display_text(), STATUS_LOADING);
        board.set_status(STATUS_DETECTING);
        assert_eq!(board.display_text(), STATUS_DETECTING);

        board.set_feedback("Powered by chocolate 🍫");
        board.set_status(STATUS_DETECTING);
        assert_eq!(board.display_text(), "Powered by chocolate 🍫");
    }

    #[test]
    fn errors_replace_feedback() {
        let board = StatusBoard::new();
        board.set_feedback("hello");
        board.set_error("camera permission denied");
        let snapshot = board.snapshot();
        assert_eq!(snapshot.display_text(), "Error: camera permission denied");
        assert!(snapshot.feedback.is_none());
    }

    #[test]
    fn every_change_bumps_revision() {
        let board = StatusBoard::new();
        let before = board.snapshot().revision;
        board.set_status("a");
        board.set_feedback("b");
        assert_eq!(board.snapshot().revision, before + 2);
    }
}
