use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

use crate::detect::result::Detection;
use crate::error::ModelLoadError;
use crate::frame::Frame;

pub const DEFAULT_INPUT_SIZE: u32 = 224;
pub const DEFAULT_MIN_SCORE: f32 = 0.5;

/// Per-call detector options.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectOptions {
    /// Square input resolution fed to the face detector. Multiple of 32.
    pub input_size: u32,
    /// Faces scoring below this are dropped.
    pub min_score: f32,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

impl DetectOptions {
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(anyhow!(
                "detector input size must be a positive multiple of 32 (got {})",
                self.input_size
            ));
        }
        if !(self.min_score > 0.0 && self.min_score <= 1.0) {
            return Err(anyhow!(
                "detector min score must be in (0, 1] (got {})",
                self.min_score
            ));
        }
        Ok(())
    }
}

/// Inference gateway trait.
///
/// The gateway wraps an external visual-inference engine. The loop treats it
/// as opaque: `init` once per session, then one `detect` per cycle. Calls may
/// block for as long as the engine needs; the loop never aborts them.
pub trait InferenceGateway: Send {
    /// Gateway identifier.
    fn name(&self) -> &'static str;

    /// Load model assets. Readiness is reached when this returns `Ok`.
    fn init(&mut self, model_source: &str) -> std::result::Result<(), ModelLoadError>;

    /// Run detection on a frame.
    ///
    /// Geometry in the returned detections is normalized to the frame.
    fn detect(&mut self, frame: &Frame, options: &DetectOptions) -> Result<Vec<Detection>>;
}

/// Gateways are shared between the controller and its session thread.
pub type SharedGateway = Arc<Mutex<dyn InferenceGateway>>;

pub fn shared_gateway<G: InferenceGateway + 'static>(gateway: G) -> SharedGateway {
    Arc::new(Mutex::new(gateway))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(DetectOptions::default().validate().is_ok());
    }

    #[test]
    fn invalid_options_are_rejected() {
        for options in [
            DetectOptions { input_size: 0, ..DetectOptions::default() },
            DetectOptions { input_size: 100, ..DetectOptions::default() },
            DetectOptions { min_score: 0.0, ..DetectOptions::default() },
            DetectOptions { min_score: 1.5, ..DetectOptions::default() },
            DetectOptions { min_score: f32::NAN, ..DetectOptions::default() },
        ] {
            assert!(options.validate().is_err(), "{options:?}");
        }
    }
}
