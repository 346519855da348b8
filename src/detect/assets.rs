//! Model asset resolution.
//!
//! A model source is either a `stub://` name (built-in stub gateway) or a local
//! directory holding the weight manifests of the three networks the pipeline
//! needs. Remote URLs are rejected: assets must be fetched ahead of time.

use std::path::{Path, PathBuf};

use crate::error::ModelLoadError;

/// Weight manifests that must be present in a model directory.
pub const REQUIRED_MANIFESTS: [&str; 3] = [
    "tiny_face_detector_model-weights_manifest.json",
    "face_landmark_68_model-weights_manifest.json",
    "face_expression_model-weights_manifest.json",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelSource {
    Stub(String),
    LocalDir(PathBuf),
}

impl ModelSource {
    pub fn parse(source: &str) -> Result<Self, ModelLoadError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(ModelLoadError::UnsupportedSource(source.to_string()));
        }
        if let Some(name) = trimmed.strip_prefix("stub://") {
            return Ok(ModelSource::Stub(name.to_string()));
        }
        if trimmed.contains("://") {
            return Err(ModelLoadError::UnsupportedSource(source.to_string()));
        }
        Ok(ModelSource::LocalDir(PathBuf::from(trimmed)))
    }
}

/// Check that every required manifest exists and parses as JSON.
pub fn verify_model_dir(dir: &Path) -> Result<(), ModelLoadError> {
    if !dir.is_dir() {
        return Err(ModelLoadError::MissingAsset(format!(
            "model directory {} not found",
            dir.display()
        )));
    }
    for manifest in REQUIRED_MANIFESTS {
        let path = dir.join(manifest);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| ModelLoadError::MissingAsset(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str::<serde_json::Value>(&raw)
            .map_err(|e| ModelLoadError::InvalidAsset(format!("{}: {}", path.display(), e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stub_and_local_sources() {
        assert_eq!(
            ModelSource::parse("stub://models").unwrap(),
            ModelSource::Stub("models".to_string())
        );
        assert_eq!(
            ModelSource::parse("/opt/models").unwrap(),
            ModelSource::LocalDir(PathBuf::from("/opt/models"))
        );
    }

    #[test]
    fn rejects_remote_and_empty_sources() {
        assert!(matches!(
            ModelSource::parse("https://example.invalid/models"),
            Err(ModelLoadError::UnsupportedSource(_))
        ));
        assert!(ModelSource::parse("  ").is_err());
    }

    #[test]
    fn model_dir_requires_every_manifest() {
        let dir = tempfile::tempdir().unwrap();
        for manifest in &REQUIRED_MANIFESTS[..2] {
            std::fs::write(dir.path().join(manifest), "[]").unwrap();
        }
        assert!(matches!(
            verify_model_dir(dir.path()),
            Err(ModelLoadError::MissingAsset(_))
        ));

        std::fs::write(dir.path().join(REQUIRED_MANIFESTS[2]), "{ not json").unwrap();
        assert!(matches!(
            verify_model_dir(dir.path()),
            Err(ModelLoadError::InvalidAsset(_))
        ));

        std::fs::write(dir.path().join(REQUIRED_MANIFESTS[2]), "[]").unwrap();
        assert!(verify_model_dir(dir.path()).is_ok());
    }
}
