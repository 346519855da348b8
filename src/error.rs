//! Error taxonomy for a capture session.
//!
//! Every error here is terminal for the current run. Nothing retries; the only
//! recovery path is a fresh `LifecycleController::start()`.

use thiserror::Error;

/// Model assets could not be located or parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelLoadError {
    #[error("unsupported model source {0:?}")]
    UnsupportedSource(String),
    #[error("model asset missing: {0}")]
    MissingAsset(String),
    #[error("model asset invalid: {0}")]
    InvalidAsset(String),
    #[error("inference gateway unavailable: {0}")]
    GatewayUnavailable(String),
}

/// The camera could not be opened or started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera permission denied")]
    Denied,
    #[error("no camera satisfies constraints: {0}")]
    Unsatisfiable(String),
    #[error("camera playback failed: {0}")]
    Playback(String),
}

/// An inference call (or the frame read feeding it) failed mid-loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("detection failed on cycle {cycle}: {message}")]
pub struct DetectionError {
    pub cycle: u64,
    pub message: String,
}

impl DetectionError {
    pub(crate) fn new(cycle: u64, err: impl std::fmt::Display) -> Self {
        Self {
            cycle,
            message: err.to_string(),
        }
    }
}

/// Reason carried by `LoopState::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("session thread panicked")]
    Panicked,
}

/// Misuse of the lifecycle controller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("a session is already {0}")]
    AlreadyActive(&'static str),
    #[error("failed to spawn session thread: {0}")]
    Spawn(#[from] std::io::Error),
}
