//! Captured video frames.
//!
//! - `Frame`: one RGB24 image read from the current capture surface.
//!
//! Frames live for exactly one cycle: they are read, handed to the inference
//! gateway, and dropped. Pixel data is zeroized on drop so camera images do
//! not linger in freed memory.

use anyhow::{anyhow, Result};
use zeroize::Zeroize;

/// One RGB24 frame. Not `Clone`: a frame has a single owner for its cycle.
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Monotonic per-stream counter, starting at 1.
    pub sequence: u64,
}

impl Frame {
    /// Wrap RGB24 pixels. Fails when the buffer does not match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// Read-only pixel access for inference gateways.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Mean luma of the pixel at (x, y). Coordinates are clamped to the frame.
    pub fn luma_at(&self, x: u32, y: u32) -> f32 {
        let x = x.min(self.width.saturating_sub(1)) as usize;
        let y = y.min(self.height.saturating_sub(1)) as usize;
        let offset = (y * self.width as usize + x) * 3;
        match self.data.get(offset..offset + 3) {
            Some(&[r, g, b]) => 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32,
            _ => 0.0,
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(3))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}
