use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::ports::TrainingFrameworkPort;
use crate::domain::config::TrainingConfig;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::metrics::StageOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainedModel {
    pub weights: Option<PathBuf>,
    pub onnx: Option<PathBuf>,
}

/// Entrenamiento delegado: reenvía la configuración tal cual al framework
/// externo y recoge los pesos resultantes en `models_dir`.
pub struct TrainingService {
    models_dir: PathBuf,
    config: TrainingConfig,
    framework: Arc<dyn TrainingFrameworkPort>,
}

impl TrainingService {
    pub fn new(models_dir: PathBuf, config: TrainingConfig, framework: Arc<dyn TrainingFrameworkPort>) -> Self {
        Self { models_dir, config, framework }
    }

    /// Parámetros `clave=valor` de `yolo detect train`.
    pub fn train_params(&self, data_yaml: &Path) -> Vec<(String, String)> {
        let c = &self.config;
        let model = if c.model_name.ends_with(".pt") || c.model_name.ends_with(".yaml") {
            c.model_name.clone()
        } else {
            format!("{}.pt", c.model_name)
        };

        [
            ("data", data_yaml.display().to_string()),
            ("model", model),
            ("epochs", c.epochs.to_string()),
            ("imgsz", c.img_size.to_string()),
            ("batch", c.batch_size.to_string()),
            ("patience", c.patience.to_string()),
            ("device", c.device.clone()),
            ("optimizer", c.optimizer.clone()),
            ("lr0", c.learning_rate.to_string()),
            ("weight_decay", c.weight_decay.to_string()),
            ("momentum", c.momentum.to_string()),
            ("seed", c.seed.to_string()),
            ("project", c.project.display().to_string()),
            ("name", c.name.clone()),
            ("exist_ok", "True".to_string()),
            ("save", "True".to_string()),
            ("save_period", c.save_period.to_string()),
            ("cache", "False".to_string()),
            ("verbose", "True".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn best_weights(&self) -> PathBuf {
        self.config.project.join(&self.config.name).join("weights").join("best.pt")
    }

    /// Entrena y devuelve `{"status": "success"|"failed", ...}`. Sólo un manifiesto
    /// inexistente es un error directo; el resto de fallos van en el resultado.
    pub fn train(&self, data_yaml: &Path) -> DomainResult<StageOutcome<TrainedModel>> {
        if !data_yaml.exists() {
            return Err(DomainError::NotFound(format!("Dataset YAML not found: {}", data_yaml.display())));
        }

        info!("Starting training with {}...", self.config.model_name);
        info!("  Dataset: {}", data_yaml.display());
        info!("  Epochs: {}, Batch Size: {}", self.config.epochs, self.config.batch_size);
        info!("  Image Size: {}, Device: {}", self.config.img_size, self.config.device);

        if let Err(e) = self.framework.train(&self.train_params(data_yaml)) {
            error!("Training failed: {}", e);
            return Ok(StageOutcome::failed(e));
        }
        info!("Training completed successfully!");

        match self.collect_weights() {
            Ok(model) => Ok(StageOutcome::Success(model)),
            Err(e) => {
                error!("Training finished but weights could not be collected: {}", e);
                Ok(StageOutcome::failed(e))
            }
        }
    }

    fn collect_weights(&self) -> DomainResult<TrainedModel> {
        let best = self.best_weights();
        if !best.exists() {
            warn!("Best weights not found at {}", best.display());
            return Ok(TrainedModel { weights: None, onnx: None });
        }

        fs::create_dir_all(&self.models_dir)?;
        let dst = self.models_dir.join("best.pt");
        fs::copy(&best, &dst)?;
        info!("Best model saved to: {}", dst.display());

        let onnx = if self.config.export_onnx {
            Some(self.framework.export_onnx(&dst, self.config.img_size)?)
        } else {
            None
        };
        Ok(TrainedModel { weights: Some(dst), onnx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Simula Ultralytics: escribe `best.pt` donde lo dejaría el entrenamiento real.
    struct FakeFramework {
        weights_out: Option<PathBuf>,
        fail: bool,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl TrainingFrameworkPort for FakeFramework {
        fn train(&self, params: &[(String, String)]) -> DomainResult<()> {
            *self.seen.lock().unwrap() = params.to_vec();
            if self.fail {
                return Err(DomainError::OperationFailed("CUDA out of memory".into()));
            }
            if let Some(path) = &self.weights_out {
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, b"weights").unwrap();
            }
            Ok(())
        }

        fn export_onnx(&self, weights: &Path, _img_size: u32) -> DomainResult<PathBuf> {
            let onnx = weights.with_extension("onnx");
            fs::write(&onnx, b"onnx")?;
            Ok(onnx)
        }
    }

    fn setup(fail: bool) -> (tempfile::TempDir, TrainingService, Arc<FakeFramework>, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig { project: dir.path().join("runs"), epochs: 3, ..TrainingConfig::default() };
        let fw = Arc::new(FakeFramework {
            weights_out: Some(dir.path().join("runs/plastic_detection/weights/best.pt")),
            fail,
            seen: Mutex::new(Vec::new()),
        });
        let svc = TrainingService::new(dir.path().join("models"), config, fw.clone());
        let data = dir.path().join("data.yaml");
        fs::write(&data, "nc: 1\n").unwrap();
        (dir, svc, fw, data)
    }

    #[test]
    fn forwards_config_and_collects_weights() {
        let (dir, svc, fw, data) = setup(false);
        let outcome = svc.train(&data).unwrap();

        let models = dir.path().join("models");
        assert_eq!(
            outcome,
            StageOutcome::Success(TrainedModel {
                weights: Some(models.join("best.pt")),
                onnx: Some(models.join("best.onnx")),
            })
        );
        let seen = fw.seen.lock().unwrap();
        assert!(seen.contains(&("epochs".to_string(), "3".to_string())));
        assert!(seen.contains(&("model".to_string(), "yolov8m.pt".to_string())));
        assert!(seen.contains(&("lr0".to_string(), "0.01".to_string())));
    }

    #[test]
    fn framework_failure_is_reported_not_raised() {
        let (_dir, svc, _fw, data) = setup(true);
        let outcome = svc.train(&data).unwrap();
        assert!(matches!(outcome, StageOutcome::Failed { ref error } if error.contains("out of memory")));
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let (dir, svc, _fw, _data) = setup(false);
        assert!(matches!(svc.train(&dir.path().join("nope.yaml")), Err(DomainError::NotFound(_))));
    }
}
