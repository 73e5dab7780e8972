use std::path::Path;
use std::sync::Arc;

use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder};

use crate::common::{FaceUnlockError, Result};

/// A loaded ONNX model and the runtime environment it lives in.
pub struct OnnxModel {
    pub session: Session,
    _environment: Arc<Environment>,
}

impl OnnxModel {
    /// Missing model files or an absent ONNX runtime are reported as
    /// `DependencyMissing`, which callers treat as a sensor failure.
    pub fn load(name: &str, model_path: &Path, optimization_level: u32) -> Result<Self> {
        if !model_path.exists() {
            return Err(FaceUnlockError::DependencyMissing(format!(
                "{} model not found at: {}",
                name,
                model_path.display()
            )));
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name(name)
                .build()
                .map_err(|e| {
                    FaceUnlockError::DependencyMissing(format!("ONNX runtime unavailable: {}", e))
                })?,
        );

        let opt_level = match optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };
        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(opt_level)?
            .with_model_from_file(model_path)?;

        tracing::debug!("Loaded {} model from {}", name, model_path.display());
        Ok(Self {
            session,
            _environment: environment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_a_missing_dependency() {
        let result = OnnxModel::load("detector", Path::new("/nonexistent/detector.onnx"), 3);
        assert!(matches!(result, Err(FaceUnlockError::DependencyMissing(_))));
    }
}
