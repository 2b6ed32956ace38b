use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::adapters::imaging::io::{check_image, ImageCheck};
use crate::application::ports::ImageSearchPort;
use crate::domain::config::ScraperConfig;
use crate::domain::errors::DomainResult;

/// Descarga imágenes por clase desde buscadores web y limpia las inservibles.
pub struct ScrapeService {
    raw_dir: PathBuf,
    config: ScraperConfig,
    primary: Arc<dyn ImageSearchPort>,
    fallback: Arc<dyn ImageSearchPort>,
}

impl ScrapeService {
    pub fn new(
        raw_dir: PathBuf,
        config: ScraperConfig,
        primary: Arc<dyn ImageSearchPort>,
        fallback: Arc<dyn ImageSearchPort>,
    ) -> Self {
        Self { raw_dir, config, primary, fallback }
    }

    /// Recorre `search_queries` clase a clase y palabra a palabra, en secuencia.
    /// Devuelve el número final de imágenes válidas por clase.
    pub async fn scrape_images(&self) -> DomainResult<BTreeMap<String, usize>> {
        fs::create_dir_all(&self.raw_dir)?;
        let mut results = BTreeMap::new();

        for (class_name, keywords) in &self.config.search_queries {
            let class_dir = self.raw_dir.join(class_name);
            fs::create_dir_all(&class_dir)?;
            info!("Scraping images for class: {}", class_name);

            if keywords.is_empty() {
                warn!("Sin palabras clave para {}", class_name);
            } else {
                let per_keyword = self.config.max_images_per_class / keywords.len();
                for keyword in keywords {
                    self.crawl_keyword(keyword, per_keyword, &class_dir).await;
                }
            }

            info!("Validating images for {}...", class_name);
            let removed = self.clean_corrupt_images(&class_dir);
            let count = self.count_images(&class_dir);
            info!("Completed {}: {} images ({} removed)", class_name, count, removed);
            results.insert(class_name.clone(), count);
        }

        Ok(results)
    }

    /// Primario y, si falla, respaldo. Un doble fallo se registra pero no aborta la etapa.
    async fn crawl_keyword(&self, keyword: &str, max_num: usize, dest: &Path) {
        info!("  Searching for: '{}'", keyword);
        match self.primary.crawl(keyword, max_num, dest).await {
            Ok(n) => info!("  {} search completed for '{}' ({} files)", self.primary.name(), keyword, n),
            Err(primary_err) => {
                warn!("{} crawl failed for '{}': {}", self.primary.name(), keyword, primary_err);
                match self.fallback.crawl(keyword, max_num, dest).await {
                    Ok(n) => info!("  {} search completed for '{}' ({} files)", self.fallback.name(), keyword, n),
                    Err(e) => error!(
                        "Both {} and {} crawls failed for '{}': {}",
                        self.primary.name(),
                        self.fallback.name(),
                        keyword,
                        e
                    ),
                }
            }
        }
    }

    fn has_configured_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else { return false };
        let ext = format!(".{}", ext.to_lowercase());
        self.config.image_extensions.iter().any(|e| e.to_lowercase() == ext)
    }

    fn image_files(&self, dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_file() && self.has_configured_extension(p))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Borra los ficheros que no se decodifican o cuyo lado menor no llega a `min_image_size`.
    pub fn clean_corrupt_images(&self, class_dir: &Path) -> usize {
        let mut removed = 0;
        for path in self.image_files(class_dir) {
            let reason = match check_image(&path, self.config.min_image_size) {
                ImageCheck::Valid { width, height } => {
                    debug!("Image validated: {} ({}x{})", path.display(), width, height);
                    continue;
                }
                ImageCheck::TooSmall { width, height } => format!("too small ({width}x{height})"),
                ImageCheck::Corrupt(e) => format!("corrupt: {e}"),
            };

            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Removed invalid image {}: {}", path.display(), reason);
                    removed += 1;
                }
                Err(e) => error!("Failed to delete {}: {}", path.display(), e),
            }
        }
        removed
    }

    fn count_images(&self, dir: &Path) -> usize {
        self.image_files(dir).len()
    }

    /// Recuento actual de imágenes por subdirectorio de `raw_dir`.
    pub fn statistics(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        if let Ok(entries) = fs::read_dir(&self.raw_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    let name = entry.file_name().to_string_lossy().to_string();
                    stats.insert(name, self.count_images(&path));
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainError;
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::Mutex;

    /// Escribe una imagen buena, una demasiado pequeña y una corrupta por llamada.
    struct FakeSearch {
        name: &'static str,
        fail: bool,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl FakeSearch {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self { name, fail, calls: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl ImageSearchPort for FakeSearch {
        fn name(&self) -> &str { self.name }

        async fn crawl(&self, keyword: &str, max_num: usize, dest: &Path) -> DomainResult<usize> {
            self.calls.lock().unwrap().push((keyword.to_string(), max_num));
            if self.fail {
                return Err(DomainError::OperationFailed("backend down".into()));
            }
            let tag = keyword.replace(' ', "_");
            RgbImage::new(64, 64).save(dest.join(format!("{tag}_ok.png"))).unwrap();
            RgbImage::new(64, 10).save(dest.join(format!("{tag}_small.png"))).unwrap();
            fs::write(dest.join(format!("{tag}_broken.jpg")), b"garbage").unwrap();
            Ok(3)
        }
    }

    fn config(queries: &[(&str, &[&str])]) -> ScraperConfig {
        ScraperConfig {
            max_images_per_class: 10,
            min_image_size: 50,
            search_queries: queries
                .iter()
                .map(|(c, k)| (c.to_string(), k.iter().map(|s| s.to_string()).collect()))
                .collect(),
            ..ScraperConfig::default()
        }
    }

    #[tokio::test]
    async fn falls_back_and_cleans_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let primary = FakeSearch::new("bing", true);
        let fallback = FakeSearch::new("google", false);
        let svc = ScrapeService::new(
            dir.path().to_path_buf(),
            config(&[("plastic_bottle", &["plastic bottle", "pet bottle"])]),
            primary.clone(),
            fallback.clone(),
        );

        let results = svc.scrape_images().await.unwrap();

        assert_eq!(results.get("plastic_bottle"), Some(&2));
        assert_eq!(primary.calls.lock().unwrap().len(), 2);
        assert_eq!(fallback.calls.lock().unwrap()[0], ("plastic bottle".to_string(), 5));

        let class_dir = dir.path().join("plastic_bottle");
        assert!(class_dir.join("plastic_bottle_ok.png").exists());
        assert!(!class_dir.join("plastic_bottle_small.png").exists());
        assert!(!class_dir.join("plastic_bottle_broken.jpg").exists());
        assert_eq!(svc.statistics().get("plastic_bottle"), Some(&2));
    }

    #[tokio::test]
    async fn primary_success_skips_fallback_and_double_failure_continues() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = FakeSearch::new("google", false);
        let ok = ScrapeService::new(
            dir.path().to_path_buf(),
            config(&[("plastic_bag", &["plastic bag"])]),
            FakeSearch::new("bing", false),
            fallback.clone(),
        );
        assert_eq!(ok.scrape_images().await.unwrap().get("plastic_bag"), Some(&1));
        assert!(fallback.calls.lock().unwrap().is_empty());

        let broken = ScrapeService::new(
            dir.path().to_path_buf(),
            config(&[("plastic_wrapper", &["wrapper"])]),
            FakeSearch::new("bing", true),
            FakeSearch::new("google", true),
        );
        assert_eq!(broken.scrape_images().await.unwrap().get("plastic_wrapper"), Some(&0));
    }
}
