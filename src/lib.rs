//! Expression Feedback
//!
//! This crate runs a live loop over a camera feed: every display refresh it
//! reads the current frame, asks an inference gateway for face detections
//! with expression scores, draws an overlay, and turns the dominant
//! expression into a short, throttled feedback message.
//!
//! # Architecture
//!
//! The loop guarantees, by construction:
//!
//! 1. **One cycle at a time**: no two `detect` calls are ever in flight.
//! 2. **No stale renders**: a result that completes after cancellation is dropped.
//! 3. **Throttled feedback**: the message changes at most once per interval.
//! 4. **Deterministic ties**: equal scores resolve by a fixed label order.
//! 5. **Full teardown**: `stop()` at any point leaves no live camera track.
//!
//! # Module Structure
//!
//! - `capture`: camera devices, streams and the `CaptureSession` owner
//! - `detect`: the `InferenceGateway` seam, detection types and gateways
//! - `detection_loop`: the detect/render/feedback cycle
//! - `feedback`: dominant-label selection and pooled messages
//! - `lifecycle`: staged startup, stop and session state
//! - `render`, `scheduler`, `status`: overlay, refresh pacing, badge text

pub mod capture;
pub mod config;
pub mod detect;
pub mod detection_loop;
pub mod error;
pub mod feedback;
pub mod frame;
pub mod lifecycle;
pub mod render;
pub mod scheduler;
pub mod status;

#[cfg(feature = "capture-v4l2")]
pub use capture::V4l2Camera;
pub use capture::{
    shared_camera, CameraProbe, CaptureConstraints, CaptureDevice, CaptureSession, Facing,
    SharedCamera, SimulatedFailure, SyntheticCamera, SyntheticCameraConfig, VideoStream,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractGateway;
pub use detect::{
    shared_gateway, BoundingBox, DetectOptions, Detection, InferenceGateway, Label, Point,
    ScoreMap, SharedGateway, StubGateway,
};
pub use detection_loop::{DetectionLoop, LoopExit, LoopPhase};
pub use error::{
    AcquisitionError, DetectionError, LifecycleError, ModelLoadError, SessionError,
};
pub use feedback::{FeedbackPoolTable, FeedbackSelector, FeedbackState};
pub use frame::Frame;
pub use lifecycle::{LifecycleController, LoopSettings, LoopState, StopHandle};
pub use render::{
    shared_renderer, LogOverlay, OverlayRenderer, OverlaySurface, PixelRect, PlacedDetection,
    SharedRenderer,
};
pub use scheduler::{CancelToken, RefreshScheduler, VsyncTicker};
pub use status::{StatusBoard, StatusSnapshot};
