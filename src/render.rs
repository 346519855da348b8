//! Overlay rendering.
//!
//! The loop scales every detection to the current display size before handing
//! it to an `OverlayRenderer`. Renderers clear and redraw on every call; they
//! have no failure mode visible to the loop.

use std::sync::{Arc, Mutex};

use crate::detect::{Detection, ScoreMap};

/// Display surface the overlay is drawn on. Its size tracks the video.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OverlaySurface {
    width: u32,
    height: u32,
    /// Bumped on every resize.
    generation: u64,
}

impl OverlaySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Match the surface to the video size. Returns true when it changed.
    pub fn resize_to(&mut self, width: u32, height: u32) -> bool {
        if (self.width, self.height) == (width, height) {
            return false;
        }
        self.width = width;
        self.height = height;
        self.generation += 1;
        true
    }
}

/// Rectangle in display pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// A detection scaled to display pixels, ready to draw.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedDetection {
    pub rect: PixelRect,
    pub score: f32,
    pub landmarks: Vec<(f32, f32)>,
    pub expressions: ScoreMap,
}

impl PlacedDetection {
    /// Scale normalized detection geometry to a `width` x `height` display.
    pub fn place(detection: &Detection, width: u32, height: u32) -> Self {
        let (sw, sh) = (width as f32, height as f32);
        let bbox = detection.bbox.clamped();
        Self {
            rect: PixelRect {
                x: bbox.x * sw,
                y: bbox.y * sh,
                w: bbox.w * sw,
                h: bbox.h * sh,
            },
            score: detection.score,
            landmarks: detection
                .landmarks
                .iter()
                .map(|p| (p.x.clamp(0.0, 1.0) * sw, p.y.clamp(0.0, 1.0) * sh))
                .collect(),
            expressions: detection.expressions,
        }
    }
}

/// Overlay renderer trait. Clears the surface and draws the given detections.
pub trait OverlayRenderer: Send {
    fn render(&mut self, detections: &[PlacedDetection], surface: &mut OverlaySurface);
}

pub type SharedRenderer = Arc<Mutex<dyn OverlayRenderer>>;

pub fn shared_renderer<R: OverlayRenderer + 'static>(renderer: R) -> SharedRenderer {
    Arc::new(Mutex::new(renderer))
}

/// Renderer for headless runs: keeps the last drawn frame and logs it.
#[derive(Debug, Default)]
pub struct LogOverlay {
    frames: u64,
    last: Vec<PlacedDetection>,
}

impl LogOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames
    }

    pub fn last_drawn(&self) -> &[PlacedDetection] {
        &self.last
    }
}

impl OverlayRenderer for LogOverlay {
    fn render(&mut self, detections: &[PlacedDetection], surface: &mut OverlaySurface) {
        self.frames += 1;
        self.last.clear();
        self.last.extend_from_slice(detections);

        let (width, height) = surface.size();
        for placed in detections {
            let dominant = placed
                .expressions
                .dominant()
                .map_or("none", |label| label.as_str());
            log::debug!(
                "overlay {}x{}: box=({:.0},{:.0} {:.0}x{:.0}) score={:.2} landmarks={} expression={}",
                width,
                height,
                placed.rect.x,
                placed.rect.y,
                placed.rect.w,
                placed.rect.h,
                placed.score,
                placed.landmarks.len(),
                dominant
            );
        }
    }
}
