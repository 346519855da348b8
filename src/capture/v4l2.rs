//! V4L2 camera.
//!
//! Opens a local device node (e.g. /dev/video0) as a memory-mapped RGB3
//! stream. V4L2 nodes carry no facing metadata and no audio, so any facing is
//! accepted and an audio request is unsatisfiable.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::io::ErrorKind;

use super::{CaptureConstraints, CaptureDevice, VideoStream};
use crate::error::AcquisitionError;
use crate::frame::{rgb_len, Frame};

pub struct V4l2Camera {
    device: String,
    target_fps: u32,
}

impl V4l2Camera {
    pub fn new(device: impl Into<String>, target_fps: u32) -> Self {
        Self {
            device: device.into(),
            target_fps,
        }
    }
}

impl CaptureDevice for V4l2Camera {
    fn name(&self) -> &str {
        &self.device
    }

    fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> std::result::Result<Box<dyn VideoStream>, AcquisitionError> {
        use v4l::video::Capture;

        if constraints.audio {
            return Err(AcquisitionError::Unsatisfiable(
                "v4l2 devices have no audio track".to_string(),
            ));
        }

        let mut device = v4l::Device::with_path(&self.device).map_err(|err| match err.kind() {
            ErrorKind::PermissionDenied => AcquisitionError::Denied,
            _ => AcquisitionError::Unavailable(format!("{}: {}", self.device, err)),
        })?;

        let mut format = device
            .format()
            .map_err(|err| AcquisitionError::Unavailable(format!("read v4l2 format: {err}")))?;
        format.width = constraints.width;
        format.height = constraints.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Camera: failed to set format on {}: {}", self.device, err);
                device.format().map_err(|err| {
                    AcquisitionError::Unavailable(format!("read v4l2 format: {err}"))
                })?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(AcquisitionError::Unsatisfiable(format!(
                "{} does not offer RGB3 frames",
                self.device
            )));
        }

        if self.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Camera: failed to set fps on {}: {}", self.device, err);
            }
        }

        log::info!(
            "V4l2Camera: opened {} ({}x{})",
            self.device,
            format.width,
            format.height
        );
        Ok(Box::new(V4l2Stream {
            device: Some(device),
            state: None,
            width: format.width,
            height: format.height,
            playing: false,
            frame_count: 0,
        }))
    }
}

#[self_referencing]
struct StreamState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// The device is held idle until `play()` maps buffers and starts streaming.
struct V4l2Stream {
    device: Option<v4l::Device>,
    state: Option<StreamState>,
    width: u32,
    height: u32,
    playing: bool,
    frame_count: u64,
}

impl VideoStream for V4l2Stream {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn play(&mut self) -> Result<()> {
        use v4l::buffer::Type;

        if self.state.is_none() {
            let device = self.device.take().context("v4l2 track already stopped")?;
            let state = StreamStateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
                },
            }
            .try_build()?;
            self.state = Some(state);
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
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 stream not started")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;

        let expected = rgb_len(self.width, self.height)?;
        let pixels = buf
            .get(..expected)
            .ok_or_else(|| anyhow!("v4l2 buffer shorter than {} bytes", expected))?
            .to_vec();
        self.frame_count += 1;
        Frame::new(pixels, self.width, self.height, self.frame_count)
    }

    fn stop_tracks(&mut self) {
        self.playing = false;
        if self.state.take().is_some() || self.device.take().is_some() {
            log::info!("V4l2Camera: stream stopped");
        }
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.state.is_some() || self.device.is_some())
    }
}
