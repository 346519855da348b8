#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectOptions, InferenceGateway};
use crate::detect::result::{BoundingBox, Detection, Label, ScoreMap};
use crate::error::ModelLoadError;
use crate::frame::Frame;

/// Output order of FER+-style expression classifiers. `None` marks classes
/// with no counterpart in `Label` (e.g. contempt); they are ignored.
pub const FERPLUS_OUTPUTS: [Option<Label>; 8] = [
    Some(Label::Neutral),
    Some(Label::Happy),
    Some(Label::Surprised),
    Some(Label::Sad),
    Some(Label::Angry),
    Some(Label::Disgusted),
    Some(Label::Fearful),
    None,
];

/// Tract-based gateway for a whole-frame ONNX expression classifier.
///
/// The model takes a `1x1xSxS` grayscale tensor and produces one logit per
/// class. The whole frame is treated as a single face, so the detection box
/// covers the full frame and carries no landmarks.
pub struct TractGateway {
    side: usize,
    outputs: Vec<Option<Label>>,
    model: Option<SimplePlan<TypedFact, Box<dyn TypedOp>>>,
}

impl TractGateway {
    pub fn new(side: usize) -> Self {
        Self {
            side,
            outputs: FERPLUS_OUTPUTS.to_vec(),
            model: None,
        }
    }

    /// Override the class order of the model output.
    pub fn with_outputs(mut self, outputs: Vec<Option<Label>>) -> Self {
        self.outputs = outputs;
        self
    }

    fn load(&self, model_path: &Path) -> Result<SimplePlan<TypedFact, Box<dyn TypedOp>>> {
        tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 1, self.side, self.side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let side = self.side;
        let (width, height) = frame.dimensions();
        let input = tract_ndarray::Array4::from_shape_fn((1, 1, side, side), |(_, _, y, x)| {
            let sx = (x as u32 * width) / side as u32;
            let sy = (y as u32 * height) / side as u32;
            frame.luma_at(sx, sy)
        });
        input.into_tensor()
    }

    fn scores_from(&self, outputs: TVec<TValue>) -> Result<ScoreMap> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let logits = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let logits: Vec<f32> = logits.iter().copied().collect();
        if logits.len() != self.outputs.len() {
            return Err(anyhow!(
                "model produced {} classes, expected {}",
                logits.len(),
                self.outputs.len()
            ));
        }

        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        Ok(self
            .outputs
            .iter()
            .zip(exps)
            .filter_map(|(label, e)| label.map(|label| (label, e / sum)))
            .collect())
    }
}

impl InferenceGateway for TractGateway {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn init(&mut self, model_source: &str) -> Result<(), ModelLoadError> {
        let path = Path::new(model_source);
        if !path.is_file() {
            return Err(ModelLoadError::MissingAsset(format!(
                "ONNX model {} not found",
                path.display()
            )));
        }
        let model = self
            .load(path)
            .map_err(|e| ModelLoadError::InvalidAsset(format!("{e:#}")))?;
        self.model = Some(model);
        log::info!("TractGateway: loaded {}", path.display());
        Ok(())
    }

    fn detect(&mut self, frame: &Frame, options: &DetectOptions) -> Result<Vec<Detection>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("tract gateway used before init"))?;
        let input = self.build_input(frame);
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let expressions = self.scores_from(outputs)?;

        let confidence = expressions
            .iter()
            .map(|(_, score)| score)
            .fold(0.0_f32, f32::max);
        if confidence < options.min_score {
            return Ok(Vec::new());
        }
        Ok(vec![Detection::new(
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            confidence,
            expressions,
        )])
    }
}
