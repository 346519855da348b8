mod assets;
mod backend;
mod backends;
mod result;

pub use assets::{verify_model_dir, ModelSource, REQUIRED_MANIFESTS};
pub use backend::{
    shared_gateway, DetectOptions, InferenceGateway, SharedGateway, DEFAULT_INPUT_SIZE,
    DEFAULT_MIN_SCORE,
};
pub use backends::StubGateway;
#[cfg(feature = "backend-tract")]
pub use backends::TractGateway;
pub use result::{BoundingBox, Detection, Label, Point, ScoreMap};
