use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::domain::config::AppConfig;
use crate::domain::errors::{DomainError, DomainResult};

/// Lee y valida el fichero de configuración YAML.
pub fn load_config(path: &Path) -> DomainResult<AppConfig> {
    if !path.exists() {
        return Err(DomainError::Config(format!("Config file not found at {}", path.display())));
    }

    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&content)
        .map_err(|e| DomainError::Config(format!("YAML mal formado en {}: {e}", path.display())))?;
    config.validate()?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Crea todos los directorios de trabajo declarados en `project`.
pub fn create_directories(config: &AppConfig) -> DomainResult<()> {
    let p = &config.project;
    for dir in [&p.raw_dir, &p.processed_dir, &p.models_dir, &p.outputs_dir, &p.metrics_dir] {
        fs::create_dir_all(dir)?;
        debug!("Ensured directory exists: {}", dir.display());
    }
    Ok(())
}
