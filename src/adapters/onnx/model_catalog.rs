use std::sync::Arc;

use crate::adapters::onnx::yolo_engine::OnnxYoloEngine;
use crate::application::ports::{DetectorPort, ModelCatalogPort};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::ModelId;

pub struct OnnxModelCatalog;

impl OnnxModelCatalog {
    pub fn new() -> Self { Self }
}

impl ModelCatalogPort for OnnxModelCatalog {
    fn validate_model(&self, model: &ModelId) -> DomainResult<()> {
        if model.onnx_path.as_os_str().is_empty() {
            return Err(DomainError::InvalidInput("onnx_path empty".into()));
        }
        if !model.onnx_path.exists() {
            return Err(DomainError::NotFound(format!("model file not found: {}", model.onnx_path.display())));
        }
        if model.onnx_path.extension().and_then(|e| e.to_str()) != Some("onnx") {
            return Err(DomainError::InvalidInput(format!(
                "se esperaba un modelo .onnx: {} (exporta los pesos con `yolo export format=onnx`)",
                model.onnx_path.display()
            )));
        }
        Ok(())
    }

    fn load(&self, model: &ModelId, class_names: Vec<String>) -> DomainResult<Arc<dyn DetectorPort>> {
        self.validate_model(model)?;
        let engine = OnnxYoloEngine::load(&model.onnx_path, class_names)
            .map_err(|e| DomainError::OperationFailed(format!("error cargando {}: {e}", model.name)))?;
        Ok(Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn rejects_missing_and_non_onnx_models() {
        let catalog = OnnxModelCatalog::new();
        let missing = ModelId { name: "best".into(), onnx_path: PathBuf::from("/nope/best.onnx") };
        assert!(matches!(catalog.validate_model(&missing), Err(DomainError::NotFound(_))));

        let empty = ModelId { name: "best".into(), onnx_path: PathBuf::new() };
        assert!(matches!(catalog.validate_model(&empty), Err(DomainError::InvalidInput(_))));

        let dir = tempfile::tempdir().unwrap();
        let pt = dir.path().join("best.pt");
        std::fs::write(&pt, b"weights").unwrap();
        let torch = ModelId { name: "best".into(), onnx_path: pt };
        assert!(matches!(catalog.validate_model(&torch), Err(DomainError::InvalidInput(_))));
    }
}
