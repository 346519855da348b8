//! Synthetic camera for `stub://` device names.
//!
//! Produces a moving test pattern so the whole loop can run without hardware.
//! Track bookkeeping is observable through a `CameraProbe`, which is how tests
//! prove that teardown left nothing open.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{CaptureConstraints, CaptureDevice, Facing, VideoStream};
use crate::error::AcquisitionError;
use crate::frame::{rgb_len, Frame};

/// Failure a synthetic camera should simulate on `open`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimulatedFailure {
    Denied,
    Unavailable,
}

#[derive(Clone, Debug)]
pub struct SyntheticCameraConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Facing modes this camera can satisfy.
    pub facings: Vec<Facing>,
    pub failure: Option<SimulatedFailure>,
    /// Make `play()` fail after a successful open.
    pub fail_play: bool,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            name: "stub://front_camera".to_string(),
            width: 640,
            height: 480,
            facings: vec![Facing::User],
            failure: None,
            fail_play: false,
        }
    }
}

/// Shared counters for a synthetic camera.
#[derive(Clone, Debug, Default)]
pub struct CameraProbe {
    live: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
    frames: Arc<AtomicU64>,
}

impl CameraProbe {
    pub fn live_tracks(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    probe: CameraProbe,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticCameraConfig) -> Self {
        Self {
            config,
            probe: CameraProbe::default(),
        }
    }

    pub fn probe(&self) -> CameraProbe {
        self.probe.clone()
    }
}

impl CaptureDevice for SyntheticCamera {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> std::result::Result<Box<dyn VideoStream>, AcquisitionError> {
        match self.config.failure {
            Some(SimulatedFailure::Denied) => return Err(AcquisitionError::Denied),
            Some(SimulatedFailure::Unavailable) => {
                return Err(AcquisitionError::Unavailable(self.config.name.clone()))
            }
            None => {}
        }
        if constraints.audio {
            return Err(AcquisitionError::Unsatisfiable(
                "synthetic camera has no audio track".to_string(),
            ));
        }
        if constraints.facing != Facing::Any && !self.config.facings.contains(&constraints.facing)
        {
            return Err(AcquisitionError::Unsatisfiable(format!(
                "facing {:?} not offered by {}",
                constraints.facing, self.config.name
            )));
        }

        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        self.probe.live.fetch_add(1, Ordering::SeqCst);
        log::info!("SyntheticCamera: opened {}", self.config.name);
        Ok(Box::new(SyntheticStream {
            width: self.config.width,
            height: self.config.height,
            fail_play: self.config.fail_play,
            playing: false,
            track_live: true,
            frame_count: 0,
            scene_state: 0,
            probe: self.probe.clone(),
        }))
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    fail_play: bool,
    playing: bool,
    track_live: bool,
    frame_count: u64,
    /// Shifts every 50 frames to simulate a changing scene.
    scene_state: u8,
    probe: CameraProbe,
}

impl SyntheticStream {
    fn generate_pixels(&self) -> Result<Vec<u8>> {
        let pixel_count = rgb_len(self.width, self.height)?;
        let shift = self.frame_count + self.scene_state as u64 * 37;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 3 + shift) % 256) as u8;
        }
        Ok(pixels)
    }
}

impl VideoStream for SyntheticStream {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn play(&mut self) -> Result<()> {
        if !self.track_live {
            return Err(anyhow!("track already stopped"));
        }
        if self.fail_play {
            return Err(anyhow!("autoplay rejected"));
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if !self.track_live {
            return Err(anyhow!("track ended"));
        }
        // A paused stream keeps showing its current frame.
        if self.playing || self.frame_count == 0 {
            self.frame_count += 1;
            if self.frame_count % 50 == 0 {
                self.scene_state = self.scene_state.wrapping_add(1);
            }
        }
        let pixels = self.generate_pixels()?;
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        Frame::new(pixels, self.width, self.height, self.frame_count)
    }

    fn stop_tracks(&mut self) {
        self.playing = false;
        if self.track_live {
            self.track_live = false;
            self.probe.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.track_live)
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
