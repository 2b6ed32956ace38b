use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::adapters::imaging::io::open_rgb;
use crate::application::ports::{DetectorPort, ModelCatalogPort};
use crate::application::preprocess_service::load_manifest;
use crate::domain::config::EvaluationConfig;
use crate::domain::dataset::{has_image_extension, ClassList, DatasetManifest, Split};
use crate::domain::detection::{Detection, NormalizedBox};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::metrics::{compute_metrics, ImageEval, Metrics, StageOutcome};
use crate::domain::model::{ModelId, YoloParams};

const RULE_WIDTH: usize = 60;

/// Evalúa el detector entrenado sobre el split de test y persiste las métricas.
pub struct EvaluationService {
    models_dir: PathBuf,
    metrics_dir: PathBuf,
    config: EvaluationConfig,
    catalog: Arc<dyn ModelCatalogPort>,
}

impl EvaluationService {
    pub fn new(
        models_dir: PathBuf,
        metrics_dir: PathBuf,
        config: EvaluationConfig,
        catalog: Arc<dyn ModelCatalogPort>,
    ) -> Self {
        Self { models_dir, metrics_dir, config, catalog }
    }

    pub fn default_model_path(&self) -> PathBuf {
        self.models_dir.join("best.onnx")
    }

    /// Evalúa `model_path` (o `<models_dir>/best.onnx`). Los fallos se devuelven
    /// como `StageOutcome::Failed`; sólo un error al escribir `metrics.json` se propaga.
    pub fn evaluate(&self, model_path: Option<&Path>, data_yaml: &Path) -> DomainResult<StageOutcome<Metrics>> {
        let model_path = model_path.map(Path::to_path_buf).unwrap_or_else(|| self.default_model_path());
        if !model_path.exists() {
            error!("Model not found: {}", model_path.display());
            return Ok(StageOutcome::failed(format!("Model not found: {}", model_path.display())));
        }

        info!("Evaluating model: {}", model_path.display());
        let outcome = match self.run(&model_path, data_yaml) {
            Ok(metrics) => {
                info!("Evaluation completed!");
                for (key, value) in metrics.entries() {
                    if let Some(v) = value {
                        info!("  {}: {:.4}", key, v);
                    }
                }
                self.save_metrics(&metrics)?;
                StageOutcome::Success(metrics)
            }
            Err(e) => {
                error!("Evaluation failed: {}", e);
                StageOutcome::failed(e)
            }
        };
        Ok(outcome)
    }

    fn run(&self, model_path: &Path, data_yaml: &Path) -> DomainResult<Metrics> {
        let manifest = load_manifest(data_yaml)?;
        let classes = manifest.class_list();

        let model = ModelId {
            name: model_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default(),
            onnx_path: model_path.to_path_buf(),
        };
        self.catalog.validate_model(&model)?;
        let detector = self.catalog.load(&model, classes.names().to_vec())?;

        let images = self.collect_test_set(&manifest, detector.as_ref(), &classes)?;
        info!("Evaluated {} test images", images.len());
        Ok(compute_metrics(&images, classes.len()))
    }

    fn collect_test_set(
        &self,
        manifest: &DatasetManifest,
        detector: &dyn DetectorPort,
        classes: &ClassList,
    ) -> DomainResult<Vec<ImageEval>> {
        let images_dir = manifest.images_dir(Split::Test);
        let labels_dir = manifest.labels_dir(Split::Test);

        let mut paths: Vec<PathBuf> = fs::read_dir(&images_dir)
            .map_err(|e| DomainError::NotFound(format!("{}: {e}", images_dir.display())))?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        paths.sort();

        let params = YoloParams::from(&self.config);
        let mut evals = Vec::with_capacity(paths.len());
        let mut skipped = 0usize;
        for path in paths {
            let img = match open_rgb(&path) {
                Ok(img) => img,
                Err(e) => {
                    warn!("Skipping unreadable test image {}: {}", path.display(), e);
                    skipped += 1;
                    continue;
                }
            };
            let predictions = match detector.detect(&img, &params) {
                Ok(predictions) => predictions,
                Err(e) => {
                    warn!("Skipping test image {} (inference failed): {}", path.display(), e);
                    skipped += 1;
                    continue;
                }
            };

            let (w, h) = img.dimensions();
            let ground_truth = read_ground_truth(&label_path(&labels_dir, &path), w, h, classes);
            evals.push(ImageEval { predictions, ground_truth });
        }

        if skipped > 0 {
            warn!("{} test images skipped", skipped);
        }
        Ok(evals)
    }

    fn save_metrics(&self, metrics: &Metrics) -> DomainResult<()> {
        fs::create_dir_all(&self.metrics_dir)?;
        let path = self.metrics_dir.join("metrics.json");
        let json = serde_json::to_string_pretty(metrics)
            .map_err(|e| DomainError::OperationFailed(format!("metrics.json: {e}")))?;
        fs::write(&path, json)?;
        info!("Metrics saved to: {}", path.display());
        Ok(())
    }

    /// Escribe `evaluation_report.txt` y devuelve su contenido.
    pub fn generate_report(&self, outcome: &StageOutcome<Metrics>) -> DomainResult<String> {
        let report = render_report(outcome);
        fs::create_dir_all(&self.metrics_dir)?;
        let path = self.metrics_dir.join("evaluation_report.txt");
        fs::write(&path, &report)?;
        info!("Report saved to: {}", path.display());
        Ok(report)
    }
}

/// `<labels_dir>/<stem>.txt`, con el mismo nombre que escribe el preprocesado
/// aunque el stem contenga puntos.
fn label_path(labels_dir: &Path, image_path: &Path) -> PathBuf {
    let stem = image_path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    labels_dir.join(format!("{stem}.txt"))
}

/// Etiquetas YOLO de una imagen en píxeles. Sin fichero no hay cajas reales;
/// las líneas mal formadas o fuera de [0, 1] se ignoran.
fn read_ground_truth(label_path: &Path, width: u32, height: u32, classes: &ClassList) -> Vec<Detection> {
    let Ok(content) = fs::read_to_string(label_path) else { return Vec::new() };
    content
        .lines()
        .filter_map(NormalizedBox::parse_line)
        .filter(|b| b.is_normalized())
        .map(|b| b.to_pixels(width, height, &classes.display_name(b.class_id)))
        .collect()
}

pub fn render_report(outcome: &StageOutcome<Metrics>) -> String {
    let mut lines = vec![
        "=".repeat(RULE_WIDTH),
        "PLASTIC WASTE DETECTION - MODEL EVALUATION REPORT".to_string(),
        "=".repeat(RULE_WIDTH),
        String::new(),
    ];

    match outcome {
        StageOutcome::Success(metrics) => {
            lines.push("METRICS:".to_string());
            lines.push("-".repeat(RULE_WIDTH));
            for (key, value) in metrics.entries() {
                let key = key.to_uppercase();
                match value {
                    Some(v) => lines.push(format!("  {key:<20}: {v:.4}")),
                    None => lines.push(format!("  {key:<20}: N/A")),
                }
            }
        }
        StageOutcome::Failed { error } => lines.push(format!("ERROR: {error}")),
    }

    lines.push(String::new());
    lines.push("=".repeat(RULE_WIDTH));
    lines.join("\n") + "\n"
}
