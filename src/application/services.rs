use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::{
    application::{
        dto::{DetectionDto, PredictionResponse},
        ports::{DetectorPort, ModelCatalogPort},
    },
    domain::{
        dataset::ClassList,
        errors::{DomainError, DomainResult},
        model::{InferenceConfig, ModelId, YoloParams},
    },
};

/// Servicio de inferencia del API: un modelo cargado, las clases del proyecto
/// y los umbrales configurados.
#[derive(Clone)]
pub struct InferenceService {
    detector: Arc<dyn DetectorPort>,
    classes: ClassList,
    config: InferenceConfig,
}

impl InferenceService {
    pub fn new(detector: Arc<dyn DetectorPort>, classes: ClassList, config: InferenceConfig) -> Self {
        Self { detector, classes, config }
    }

    /// Valida el modelo con el catálogo antes de cargarlo.
    pub fn load(
        catalog: &dyn ModelCatalogPort,
        model_path: &Path,
        classes: ClassList,
        params: YoloParams,
    ) -> DomainResult<Self> {
        let model = ModelId {
            name: model_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            onnx_path: model_path.to_path_buf(),
        };
        catalog.validate_model(&model)?;

        info!("Loading model from {}", model_path.display());
        let detector = catalog.load(&model, classes.names().to_vec())?;
        info!("Model loaded successfully");

        Ok(Self::new(detector, classes, InferenceConfig { model, params }))
    }

    /// Decodifica la imagen subida y detecta. Los ids de clase fuera de la lista
    /// del proyecto se nombran `class_<id>`.
    pub fn predict(&self, bytes: &[u8]) -> DomainResult<PredictionResponse> {
        let started = Instant::now();

        let img = image::load_from_memory(bytes)
            .map_err(|e| DomainError::InvalidInput(format!("Invalid image: {e}")))?
            .to_rgb8();
        let (width, height) = img.dimensions();

        let detections = self.detector.detect(&img, &self.config.params)?;
        let detections: Vec<DetectionDto> = detections
            .into_iter()
            .map(|mut d| {
                d.label = self.classes.display_name(d.class_id);
                DetectionDto::from(d)
            })
            .collect();

        let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "{}: {} detections in {:.1} ms ({}x{})",
            self.config.model.name,
            detections.len(),
            processing_time_ms,
            width,
            height
        );

        Ok(PredictionResponse { detections, processing_time_ms, image_size: [width, height] })
    }
}
