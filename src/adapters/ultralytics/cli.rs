use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

use crate::application::ports::TrainingFrameworkPort;
use crate::domain::errors::{DomainError, DomainResult};

/// Adaptador sobre la CLI `yolo` de Ultralytics. La salida del proceso hijo
/// se hereda para que el progreso del entrenamiento se vea en la terminal.
pub struct UltralyticsCli {
    executable: String,
}

impl UltralyticsCli {
    pub fn new(executable: impl Into<String>) -> Self {
        Self { executable: executable.into() }
    }

    fn run(&self, args: &[String]) -> DomainResult<()> {
        debug!("Ejecutando: {} {}", self.executable, args.join(" "));

        let status = Command::new(&self.executable)
            .args(args)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| DomainError::OperationFailed(format!("no se pudo lanzar '{}': {e}", self.executable)))?;

        if !status.success() {
            return Err(DomainError::OperationFailed(format!(
                "'{} {}' terminó con {}",
                self.executable,
                args.first().map(String::as_str).unwrap_or_default(),
                status
            )));
        }
        Ok(())
    }
}

fn key_values(params: &[(String, String)]) -> impl Iterator<Item = String> + '_ {
    params.iter().map(|(k, v)| format!("{k}={v}"))
}

impl TrainingFrameworkPort for UltralyticsCli {
    fn train(&self, params: &[(String, String)]) -> DomainResult<()> {
        let mut args = vec!["detect".to_string(), "train".to_string()];
        args.extend(key_values(params));
        self.run(&args)
    }

    fn export_onnx(&self, weights: &Path, img_size: u32) -> DomainResult<PathBuf> {
        info!("Exportando {} a ONNX...", weights.display());
        let args = vec![
            "export".to_string(),
            format!("model={}", weights.display()),
            "format=onnx".to_string(),
            format!("imgsz={img_size}"),
        ];
        self.run(&args)?;

        let onnx = weights.with_extension("onnx");
        if !onnx.exists() {
            return Err(DomainError::NotFound(format!("export sin resultado: {}", onnx.display())));
        }
        Ok(onnx)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn exit_status_drives_the_result() {
        assert!(UltralyticsCli::new("true").train(&[("epochs".into(), "1".into())]).is_ok());
        assert!(matches!(
            UltralyticsCli::new("false").train(&[]),
            Err(DomainError::OperationFailed(_))
        ));
        assert!(UltralyticsCli::new("/no/such/yolo").train(&[]).is_err());
    }

    #[test]
    fn export_requires_the_onnx_file() {
        let dir = tempfile::tempdir().unwrap();
        let weights = dir.path().join("best.pt");
        assert!(matches!(
            UltralyticsCli::new("true").export_onnx(&weights, 640),
            Err(DomainError::NotFound(_))
        ));

        std::fs::write(dir.path().join("best.onnx"), b"onnx").unwrap();
        assert_eq!(UltralyticsCli::new("true").export_onnx(&weights, 640).unwrap(), dir.path().join("best.onnx"));
    }
}
