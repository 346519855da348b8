use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::detect::assets::{verify_model_dir, ModelSource};
use crate::detect::backend::{DetectOptions, InferenceGateway};
use crate::detect::result::{BoundingBox, Detection, Label, Point, ScoreMap};
use crate::error::ModelLoadError;
use crate::frame::Frame;

/// Stub gateway. Derives repeatable pseudo-scores from a coarse luma histogram.
///
/// The same frame content always yields the same detection, so runs against
/// the synthetic camera are reproducible.
#[derive(Default)]
pub struct StubGateway {
    ready: bool,
    calls: u64,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl InferenceGateway for StubGateway {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn init(&mut self, model_source: &str) -> Result<(), ModelLoadError> {
        match ModelSource::parse(model_source)? {
            ModelSource::Stub(name) => {
                log::info!("StubGateway: loaded stub models '{}'", name);
            }
            ModelSource::LocalDir(dir) => {
                verify_model_dir(&dir)?;
                log::info!("StubGateway: verified model manifests in {}", dir.display());
            }
        }
        self.ready = true;
        Ok(())
    }

    fn detect(&mut self, frame: &Frame, options: &DetectOptions) -> Result<Vec<Detection>> {
        if !self.ready {
            return Err(anyhow!("stub gateway used before init"));
        }
        self.calls += 1;

        let digest = histogram_digest(frame, options.input_size);
        let face_score = 0.6 + (digest[7] as f32 / 255.0) * 0.4;
        if face_score < options.min_score {
            return Ok(Vec::new());
        }

        let expressions: ScoreMap = Label::ALL
            .into_iter()
            .zip(digest.iter())
            .map(|(label, &byte)| (label, byte as f32 / 255.0))
            .collect();

        let w = 0.3 + (digest[8] as f32 / 255.0) * 0.2;
        let h = (w * 1.2).min(0.9);
        let bbox = BoundingBox::new((1.0 - w) / 2.0, (1.0 - h) / 2.0, w, h);

        Ok(vec![
            Detection::new(bbox, face_score, expressions).with_landmarks(face_points(bbox))
        ])
    }
}

/// SHA-256 over an 8-bin luma histogram sampled on an `input_size` grid.
fn histogram_digest(frame: &Frame, input_size: u32) -> [u8; 32] {
    let grid = input_size.clamp(1, 64);
    let mut histogram = [0u32; 8];
    for gy in 0..grid {
        for gx in 0..grid {
            let x = gx * frame.width / grid;
            let y = gy * frame.height / grid;
            let luma = frame.luma_at(x, y).clamp(0.0, 255.0) as u8;
            histogram[(luma / 32) as usize] += 1;
        }
    }

    let mut hasher = Sha256::new();
    for count in &histogram {
        hasher.update(count.to_le_bytes());
    }
    hasher.finalize().into()
}

/// Eye centers, nose tip and mouth corners placed inside the face box.
fn face_points(bbox: BoundingBox) -> Vec<Point> {
    [(0.3, 0.38), (0.7, 0.38), (0.5, 0.58), (0.35, 0.78), (0.65, 0.78)]
        .into_iter()
        .map(|(fx, fy)| Point {
            x: bbox.x + bbox.w * fx,
            y: bbox.y + bbox.h * fy,
        })
        .collect()
}
