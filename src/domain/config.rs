use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::errors::{DomainError, DomainResult};

/// Configuración completa del proyecto, tal y como se lee de `config.yaml`.
/// Es de solo lectura una vez cargada.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub project: ProjectConfig,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub preprocessing: PreprocessConfig,
    #[serde(default)]
    pub auto_label: AutoLabelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_project_name")]
    pub name: String,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub models_dir: PathBuf,
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,
    #[serde(default = "default_metrics_dir")]
    pub metrics_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub max_images_per_class: usize,
    pub timeout: u64, // segundos
    pub image_extensions: Vec<String>,
    pub min_image_size: u32,
    pub search_queries: BTreeMap<String, Vec<String>>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_images_per_class: 500,
            timeout: 10,
            image_extensions: vec![".jpg".into(), ".jpeg".into(), ".png".into()],
            min_image_size: 50,
            search_queries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub train_split: f64,
    pub val_split: f64,
    pub test_split: f64,
    pub seed: u64,
    pub augmentation: AugmentationConfig,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            train_split: 0.8,
            val_split: 0.1,
            test_split: 0.1,
            seed: 42,
            augmentation: AugmentationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    pub enabled: bool,
    pub augmentation_factor: usize,
    pub transforms: TransformConfig,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self { enabled: false, augmentation_factor: 1, transforms: TransformConfig::default() }
    }
}

/// Parámetros de cada transformación. `None` (o 0) desactiva la transformación.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub horizontal_flip: Option<f64>, // probabilidad
    pub vertical_flip: Option<f64>,   // probabilidad
    pub rotation: Option<f32>,        // límite en grados
    pub brightness: Option<f32>,      // límite relativo
    pub contrast: Option<f32>,        // límite relativo
    pub blur: Option<u32>,            // tamaño máximo de kernel
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoLabelConfig {
    pub model_name: String,
    pub model_path: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub img_size: u32,
}

impl Default for AutoLabelConfig {
    fn default() -> Self {
        Self {
            model_name: "yolov8n".into(),
            model_path: None,
            confidence_threshold: 0.3,
            iou_threshold: 0.45,
            img_size: 640,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub model_name: String,
    pub epochs: u32,
    pub batch_size: u32,
    pub img_size: u32,
    pub patience: u32,
    pub device: String,
    pub optimizer: String,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub momentum: f64,
    pub seed: u64,
    pub project: PathBuf,
    pub name: String,
    pub save_period: u32,
    pub export_onnx: bool,
    pub executable: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_name: "yolov8m".into(),
            epochs: 50,
            batch_size: 16,
            img_size: 640,
            patience: 10,
            device: "0".into(),
            optimizer: "SGD".into(),
            learning_rate: 0.01,
            weight_decay: 0.0005,
            momentum: 0.937,
            seed: 42,
            project: PathBuf::from("runs/detect"),
            name: "plastic_detection".into(),
            save_period: 10,
            export_onnx: true,
            executable: "yolo".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub img_size: u32,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { confidence_threshold: 0.5, iou_threshold: 0.45, img_size: 640 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub img_size: u32,
    pub max_file_size_mb: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            workers: 4,
            model_path: PathBuf::from("./models/best.onnx"),
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            img_size: 640,
            max_file_size_mb: 10,
        }
    }
}

impl ApiConfig {
    pub fn max_upload_bytes(&self) -> usize {
        (self.max_file_size_mb * 1024 * 1024) as usize
    }
}

fn default_project_name() -> String { "plastic_waste_detection".into() }
fn default_outputs_dir() -> PathBuf { PathBuf::from("outputs") }
fn default_metrics_dir() -> PathBuf { PathBuf::from("metrics") }

const SPLIT_TOLERANCE: f64 = 1e-6;

impl AppConfig {
    /// Comprueba las invariantes que serde no puede expresar.
    pub fn validate(&self) -> DomainResult<()> {
        let p = &self.preprocessing;
        for (name, ratio) in [("train_split", p.train_split), ("val_split", p.val_split), ("test_split", p.test_split)] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(DomainError::Config(format!("{name} fuera de [0, 1]: {ratio}")));
            }
        }
        let total = p.train_split + p.val_split + p.test_split;
        if total > 1.0 + SPLIT_TOLERANCE {
            return Err(DomainError::Config(format!("la suma de splits supera 1: {total}")));
        }
        if p.augmentation.enabled && p.augmentation.augmentation_factor == 0 {
            return Err(DomainError::Config("augmentation_factor debe ser >= 1".into()));
        }
        Ok(())
    }

    /// Ruta del detector preentrenado usado por el auto-etiquetado.
    pub fn auto_label_model_path(&self) -> PathBuf {
        self.auto_label.model_path.clone().unwrap_or_else(|| {
            self.project.models_dir.join(format!("{}.onnx", self.auto_label.model_name))
        })
    }
}
