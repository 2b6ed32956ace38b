use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::ports::ModelCatalogPort;
use crate::application::services::InferenceService;
use crate::domain::config::ApiConfig;
use crate::domain::dataset::ClassList;
use crate::domain::model::YoloParams;

/// Contexto compartido por los manejadores de Axum.
/// El modelo se instala una sola vez, cuando termina la carga en segundo plano;
/// hasta entonces los endpoints de inferencia responden 503.
#[derive(Clone)]
pub struct AppContext {
    pub inference: Arc<OnceLock<InferenceService>>,
    pub api: Arc<ApiConfig>,
    pub classes: ClassList,
    /// Nombre del modelo base de entrenamiento, informado por `/info/`.
    pub model_name: String,
}

impl AppContext {
    pub fn new(api: ApiConfig, classes: ClassList, model_name: String) -> Self {
        Self { inference: Arc::new(OnceLock::new()), api: Arc::new(api), classes, model_name }
    }

    pub fn model(&self) -> Option<&InferenceService> {
        self.inference.get()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.inference.get().is_some()
    }

    /// Instala el servicio de inferencia. Devuelve `false` si ya había uno.
    pub fn install(&self, service: InferenceService) -> bool {
        self.inference.set(service).is_ok()
    }

    /// Carga `api.model_path` en un hilo bloqueante. Un fallo deja el API en
    /// estado `unhealthy` pero no detiene el servidor.
    pub fn load_model_in_background(&self, catalog: Arc<dyn ModelCatalogPort>) -> JoinHandle<()> {
        let ctx = self.clone();
        tokio::task::spawn_blocking(move || {
            let params = YoloParams::from(ctx.api.as_ref());
            match InferenceService::load(catalog.as_ref(), &ctx.api.model_path, ctx.classes.clone(), params) {
                Ok(service) => {
                    ctx.install(service);
                    info!("✅ Modelo listo: {}", ctx.api.model_path.display());
                }
                Err(e) => error!("Failed to load model: {}", e),
            }
        })
    }
}
