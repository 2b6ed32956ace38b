use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::{detection::Detection, errors::DomainResult, model::*};

/// Detector de objetos ya cargado. La inferencia no guarda estado entre llamadas.
pub trait DetectorPort: Send + Sync {
    fn detect(&self, image: &RgbImage, params: &YoloParams) -> DomainResult<Vec<Detection>>;
}

/// Localiza y carga modelos de detección.
pub trait ModelCatalogPort: Send + Sync {
    fn validate_model(&self, model: &ModelId) -> DomainResult<()>;
    /// `class_names` traduce los ids de salida del modelo a nombres.
    fn load(&self, model: &ModelId, class_names: Vec<String>) -> DomainResult<Arc<dyn DetectorPort>>;
}

/// Buscador de imágenes externo (Bing, Google...).
#[async_trait]
pub trait ImageSearchPort: Send + Sync {
    fn name(&self) -> &str;
    /// Descarga hasta `max_num` imágenes de `keyword` en `dest`. Devuelve cuántas descargó.
    async fn crawl(&self, keyword: &str, max_num: usize, dest: &Path) -> DomainResult<usize>;
}

/// Framework de entrenamiento externo.
pub trait TrainingFrameworkPort: Send + Sync {
    /// Entrena con los parámetros `clave=valor` indicados.
    fn train(&self, params: &[(String, String)]) -> DomainResult<()>;
    /// Exporta unos pesos entrenados a ONNX y devuelve la ruta del `.onnx`.
    fn export_onnx(&self, weights: &Path, img_size: u32) -> DomainResult<PathBuf>;
}
