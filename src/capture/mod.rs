//! Live capture sources.
//!
//! This module provides the camera side of the loop:
//! - `CaptureDevice`: something that can open a live stream for constraints
//! - `VideoStream`: an open stream with play/pause, frame reads and tracks
//! - `CaptureSession`: owner of at most one open stream, with idempotent release
//!
//! Devices:
//! - Synthetic camera for `stub://` names (testing, demos)
//! - Local V4L2 devices (feature: capture-v4l2)
//!
//! The capture layer MUST NOT:
//! - Store frames to disk
//! - Keep a stream open after `release()` returns

pub mod synthetic;
#[cfg(feature = "capture-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::error::AcquisitionError;
use crate::frame::Frame;

pub use synthetic::{CameraProbe, SimulatedFailure, SyntheticCamera, SyntheticCameraConfig};
#[cfg(feature = "capture-v4l2")]
pub use v4l2::V4l2Camera;

/// Which way the camera should face.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    User,
    Environment,
    Any,
}

impl FromStr for Facing {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Facing::User),
            "environment" => Ok(Facing::Environment),
            "any" => Ok(Facing::Any),
            other => Err(anyhow!("unknown camera facing '{}'", other)),
        }
    }
}

/// Constraints for opening a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub facing: Facing,
    pub audio: bool,
    /// Ideal frame width. Devices may pick the nearest supported size.
    pub width: u32,
    /// Ideal frame height.
    pub height: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            facing: Facing::User,
            audio: false,
            width: 640,
            height: 480,
        }
    }
}

/// A camera that can open live streams.
pub trait CaptureDevice: Send {
    fn name(&self) -> &str;

    /// Request a live stream. The returned stream holds open tracks until
    /// `stop_tracks` is called.
    fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> std::result::Result<Box<dyn VideoStream>, AcquisitionError>;
}

/// An open live stream.
pub trait VideoStream: Send {
    /// Current frame dimensions. May change between frames.
    fn dimensions(&self) -> (u32, u32);

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    /// Read the frame currently shown by the stream.
    fn read_frame(&mut self) -> Result<Frame>;

    /// Stop every underlying track. Must be idempotent.
    fn stop_tracks(&mut self);

    /// Number of tracks still live.
    fn live_tracks(&self) -> usize;
}

pub type SharedCamera = Arc<Mutex<dyn CaptureDevice>>;

pub fn shared_camera<C: CaptureDevice + 'static>(camera: C) -> SharedCamera {
    Arc::new(Mutex::new(camera))
}

/// Owner of at most one open stream.
///
/// `release()` is safe to call any number of times, including on a session
/// that never acquired anything. Dropping the session releases it.
pub struct CaptureSession {
    device: SharedCamera,
    stream: Option<Box<dyn VideoStream>>,
}

impl CaptureSession {
    pub fn new(device: SharedCamera) -> Self {
        Self {
            device,
            stream: None,
        }
    }

    /// Open a stream matching `constraints`.
    ///
    /// A stream left over from an earlier acquire is released first, so at most
    /// one stream is ever live per session.
    pub fn acquire(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> std::result::Result<(), AcquisitionError> {
        if self.stream.is_some() {
            log::warn!("CaptureSession: releasing previous stream before re-acquire");
            self.release();
        }
        let stream = {
            let mut device = self
                .device
                .lock()
                .map_err(|_| AcquisitionError::Unavailable("camera lock poisoned".to_string()))?;
            log::info!(
                "CaptureSession: requesting {} (facing={:?}, audio={})",
                device.name(),
                constraints.facing,
                constraints.audio
            );
            device.open(constraints)?
        };
        let (width, height) = stream.dimensions();
        log::info!("CaptureSession: acquired {}x{} stream", width, height);
        self.stream = Some(stream);
        Ok(())
    }

    pub fn is_acquired(&self) -> bool {
        self.stream.is_some()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.stream.as_ref().map(|stream| stream.dimensions())
    }

    pub fn play(&mut self) -> std::result::Result<(), AcquisitionError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| AcquisitionError::Playback("no stream acquired".to_string()))?;
        stream
            .play()
            .map_err(|e| AcquisitionError::Playback(format!("{e:#}")))
    }

    pub fn pause(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            if stream.is_playing() {
                stream.pause();
            }
        }
    }

    pub fn read_frame(&mut self) -> Result<Frame> {
        self.stream
            .as_mut()
            .ok_or_else(|| anyhow!("capture stream released"))?
            .read_frame()
    }

    pub fn live_tracks(&self) -> usize {
        self.stream.as_ref().map_or(0, |stream| stream.live_tracks())
    }

    /// Pause playback and stop every track. No-op when nothing is held.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if stream.is_playing() {
                stream.pause();
            }
            stream.stop_tracks();
            log::info!("CaptureSession: released stream");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}
