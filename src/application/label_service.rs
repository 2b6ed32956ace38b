use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::adapters::imaging::io::open_rgb;
use crate::application::ports::DetectorPort;
use crate::domain::dataset::{has_image_extension, ClassList};
use crate::domain::detection::NormalizedBox;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::YoloParams;

/// `(total, etiquetadas)` de un directorio de clase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelCounts {
    pub total: usize,
    pub labeled: usize,
}

/// Genera etiquetas YOLO iniciales con un detector preentrenado (COCO).
/// Las etiquetas se escriben junto a cada imagen cruda y conviene revisarlas a mano.
pub struct AutoLabelService {
    raw_dir: PathBuf,
    classes: ClassList,
    detector: Arc<dyn DetectorPort>,
    params: YoloParams,
}

impl AutoLabelService {
    pub fn new(raw_dir: PathBuf, classes: ClassList, detector: Arc<dyn DetectorPort>, params: YoloParams) -> Self {
        Self { raw_dir, classes, detector, params }
    }

    /// Detecta, mapea a clases del proyecto y normaliza. Las detecciones sin
    /// clase equivalente se descartan.
    pub fn label_lines(&self, image_path: &Path) -> DomainResult<Vec<NormalizedBox>> {
        let img = open_rgb(image_path).map_err(|e| DomainError::InvalidInput(format!("Failed to read image: {e}")))?;
        let (width, height) = img.dimensions();

        let detections = self.detector.detect(&img, &self.params)?;
        Ok(detections
            .iter()
            .filter_map(|det| {
                let class_id = self.classes.closest_class(&det.label)?;
                det.normalize(width, height, class_id)
            })
            .collect())
    }

    pub fn auto_label_directory(&self, class_dir: &Path) -> LabelCounts {
        let mut counts = LabelCounts::default();
        info!("Auto-labeling {}...", class_dir.display());

        let mut images: Vec<PathBuf> = fs::read_dir(class_dir)
            .map(|entries| entries.flatten().map(|e| e.path()).filter(|p| p.is_file() && has_image_extension(p)).collect())
            .unwrap_or_default();
        images.sort();

        for image_path in images {
            counts.total += 1;
            let label_path = image_path.with_extension("txt");

            let boxes = match self.label_lines(&image_path) {
                Ok(boxes) => boxes,
                Err(e) => {
                    error!("Error processing {}: {}", image_path.display(), e);
                    continue;
                }
            };

            let content: String = boxes.iter().map(|b| format!("{b}\n")).collect();
            if let Err(e) = fs::write(&label_path, content) {
                error!("Error writing {}: {}", label_path.display(), e);
                continue;
            }

            if boxes.is_empty() {
                debug!("No detections in {}", image_path.display());
            } else {
                counts.labeled += 1;
                debug!("Labeled {} with {} detections", image_path.display(), boxes.len());
            }
        }
        counts
    }

    pub fn auto_label_all(&self) -> BTreeMap<String, LabelCounts> {
        let mut results = BTreeMap::new();
        for class_name in self.classes.names() {
            let class_dir = self.raw_dir.join(class_name);
            let counts = if class_dir.is_dir() {
                self.auto_label_directory(&class_dir)
            } else {
                warn!("Class directory not found: {}", class_dir.display());
                LabelCounts::default()
            };
            results.insert(class_name.clone(), counts);
        }
        results
    }
}
