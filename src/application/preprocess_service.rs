use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::adapters::imaging::augment::Augmenter;
use crate::adapters::imaging::io::{open_rgb, save_jpeg};
use crate::domain::config::PreprocessConfig;
use crate::domain::dataset::{
    has_image_extension, ClassList, DatasetManifest, DatasetSplit, ImageRecord, Split, SplitRatios, SplitStats,
};
use crate::domain::detection::NormalizedBox;
use crate::domain::errors::{DomainError, DomainResult};

/// Convierte las imágenes crudas por clase en un dataset YOLO
/// (`images/<split>` + `labels/<split>`) con su manifiesto.
pub struct PreprocessService {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
    classes: ClassList,
    config: PreprocessConfig,
}

impl PreprocessService {
    pub fn new(raw_dir: PathBuf, processed_dir: PathBuf, classes: ClassList, config: PreprocessConfig) -> Self {
        Self { raw_dir, processed_dir, classes, config }
    }

    fn images_dir(&self, split: Split) -> PathBuf {
        self.processed_dir.join("images").join(split.as_str())
    }

    fn labels_dir(&self, split: Split) -> PathBuf {
        self.processed_dir.join("labels").join(split.as_str())
    }

    fn create_yolo_structure(&self) -> DomainResult<()> {
        for split in Split::ALL {
            fs::create_dir_all(self.images_dir(split))?;
            fs::create_dir_all(self.labels_dir(split))?;
        }
        info!("Created YOLO directory structure under {}", self.processed_dir.display());
        Ok(())
    }

    /// Reúne las imágenes de cada clase, ordenadas por ruta para que el barajado
    /// con semilla sea reproducible. Las clases sin directorio se omiten.
    pub fn collect_images(&self) -> Vec<ImageRecord> {
        let mut records = Vec::new();

        for (class_id, class_name) in self.classes.names().iter().enumerate() {
            let class_dir = self.raw_dir.join(class_name);
            let entries = match fs::read_dir(&class_dir) {
                Ok(entries) => entries,
                Err(_) => {
                    warn!("Class directory not found: {}", class_dir.display());
                    continue;
                }
            };

            let mut paths: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file() && has_image_extension(p))
                .collect();
            paths.sort();

            records.extend(paths.into_iter().map(|path| ImageRecord {
                path,
                class_id,
                class_name: class_name.clone(),
            }));
        }
        records
    }

    pub fn split(&self, records: Vec<ImageRecord>) -> DatasetSplit {
        let ratios = SplitRatios { train: self.config.train_split, val: self.config.val_split };
        DatasetSplit::partition(records, ratios, self.config.seed)
    }

    /// Baraja, reparte y escribe imágenes y etiquetas. Un conjunto crudo vacío
    /// devuelve estadísticas vacías; los fallos por imagen se cuentan y se continúa.
    pub fn preprocess_and_split(&self) -> DomainResult<SplitStats> {
        let records = self.collect_images();
        if records.is_empty() {
            error!("No images found in raw directory {}", self.raw_dir.display());
            return Ok(SplitStats::default());
        }
        info!("Found {} images across {} classes", records.len(), self.classes.len());

        self.create_yolo_structure()?;
        let dataset = self.split(records);
        info!(
            "Split {} images: train={}, val={}, test={}",
            dataset.len(),
            dataset.train.len(),
            dataset.val.len(),
            dataset.test.len()
        );

        let aug = &self.config.augmentation;
        let augmenter = Augmenter::new(aug.transforms.clone());
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let extra_copies = if aug.enabled { aug.augmentation_factor.saturating_sub(1) } else { 0 };

        let mut stats = SplitStats::default();
        for split in Split::ALL {
            let images = dataset.get(split);
            info!("Processing {} split ({} images)...", split, images.len());

            let copies = if split == Split::Train { extra_copies } else { 0 };
            let mut written = 0;
            for record in images {
                match self.process_image(record, split, copies, &augmenter, &mut rng) {
                    Ok(n) => written += n,
                    Err(e) => {
                        error!("Error processing {}: {}", record.path.display(), e);
                        stats.failed += 1;
                    }
                }
            }

            info!("  Completed {}: {} images", split, written);
            stats.images.insert(split, written);
        }

        Ok(stats)
    }

    /// Escribe la imagen re-codificada, su etiqueta y `copies` variantes aumentadas.
    /// Devuelve cuántas imágenes se escribieron.
    fn process_image(
        &self,
        record: &ImageRecord,
        split: Split,
        copies: usize,
        augmenter: &Augmenter,
        rng: &mut StdRng,
    ) -> DomainResult<usize> {
        let img = open_rgb(&record.path).map_err(|e| DomainError::InvalidInput(e.to_string()))?;
        let stem = record.output_stem();
        let label = record.full_image_label();

        self.write_sample(&img, &stem, split, &label)?;
        let mut written = 1;

        for i in 0..copies {
            let augmented = augmenter.apply(&img, rng);
            match self.write_sample(&augmented, &format!("{stem}_aug_{i}"), split, &label) {
                Ok(()) => written += 1,
                Err(e) => error!("Error augmenting {} (iteration {}): {}", record.path.display(), i, e),
            }
        }
        Ok(written)
    }

    fn write_sample(&self, img: &image::RgbImage, stem: &str, split: Split, label: &NormalizedBox) -> DomainResult<()> {
        let image_path = self.images_dir(split).join(format!("{stem}.jpg"));
        save_jpeg(img, &image_path).map_err(|e| DomainError::OperationFailed(e.to_string()))?;
        fs::write(self.labels_dir(split).join(format!("{stem}.txt")), format!("{label}\n"))?;
        Ok(())
    }

    pub fn manifest(&self) -> DatasetManifest {
        DatasetManifest::new(&self.processed_dir, &self.classes)
    }

    pub fn save_dataset_yaml(&self, output: &Path) -> DomainResult<()> {
        let yaml = serde_yaml::to_string(&self.manifest())
            .map_err(|e| DomainError::OperationFailed(format!("manifiesto: {e}")))?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, yaml)?;
        info!("Saved dataset.yaml to {}", output.display());
        Ok(())
    }
}

/// Lee un `data.yaml` escrito por `save_dataset_yaml` (o por cualquier herramienta YOLO
/// que use la misma forma).
pub fn load_manifest(path: &Path) -> DomainResult<DatasetManifest> {
    if !path.exists() {
        return Err(DomainError::NotFound(format!("Dataset YAML not found: {}", path.display())));
    }
    let content = fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| DomainError::Config(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{AugmentationConfig, TransformConfig};
    use image::{Rgb, RgbImage};
    use std::collections::BTreeSet;

    fn write_raw(root: &Path, class: &str, n: usize) {
        let dir = root.join(class);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..n {
            RgbImage::from_pixel(12, 10, Rgb([i as u8, 0, 0])).save(dir.join(format!("{i:06}.png"))).unwrap();
        }
    }

    fn service(root: &Path, classes: &[&str], config: PreprocessConfig) -> PreprocessService {
        PreprocessService::new(
            root.join("raw"),
            root.join("processed"),
            ClassList::new(classes.iter().map(|c| c.to_string()).collect()),
            config,
        )
    }

    fn files(dir: &Path) -> BTreeSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.path().file_stem().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn hundred_images_give_80_10_10_with_labels() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(&dir.path().join("raw"), "plastic_bottle", 50);
        write_raw(&dir.path().join("raw"), "plastic_bag", 50);
        let svc = service(dir.path(), &["plastic_bottle", "plastic_bag", "plastic_wrapper"], PreprocessConfig::default());

        let stats = svc.preprocess_and_split().unwrap();
        assert_eq!(stats.count(Split::Train), 80);
        assert_eq!(stats.count(Split::Val), 10);
        assert_eq!(stats.count(Split::Test), 10);
        assert_eq!(stats.failed, 0);

        let processed = dir.path().join("processed");
        let mut all = BTreeSet::new();
        for split in Split::ALL {
            let images = files(&processed.join("images").join(split.as_str()));
            let labels = files(&processed.join("labels").join(split.as_str()));
            assert_eq!(images, labels, "cada imagen de {split} tiene su etiqueta");
            for stem in images {
                assert!(all.insert(stem), "imagen repetida entre splits");
            }
        }
        // Los mismos nombres existen en ambas clases: el prefijo evita colisiones.
        assert_eq!(all.len(), 100);

        let label = fs::read_to_string(processed.join("labels/train").join(
            files(&processed.join("labels/train")).into_iter().next().unwrap() + ".txt",
        ))
        .unwrap();
        assert!(label.ends_with(" 0.500000 0.500000 1.000000 1.000000\n"));
    }

    #[test]
    fn same_seed_reproduces_assignments() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(&dir.path().join("raw"), "a", 30);
        let svc = service(dir.path(), &["a"], PreprocessConfig::default());
        let first = svc.split(svc.collect_images());
        let second = svc.split(svc.collect_images());
        assert_eq!(first, second);
    }

    #[test]
    fn empty_raw_set_returns_empty_stats() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), &["missing_class"], PreprocessConfig::default());
        let stats = svc.preprocess_and_split().unwrap();
        assert!(stats.is_empty());
    }

    #[test]
    fn augmentation_adds_factor_minus_one_training_copies() {
        let dir = tempfile::tempdir().unwrap();
        write_raw(&dir.path().join("raw"), "a", 10);
        fs::write(dir.path().join("raw/a/zz_broken.jpg"), b"nope").unwrap();

        let config = PreprocessConfig {
            train_split: 1.0,
            val_split: 0.0,
            test_split: 0.0,
            augmentation: AugmentationConfig {
                enabled: true,
                augmentation_factor: 3,
                transforms: TransformConfig { horizontal_flip: Some(0.5), ..TransformConfig::default() },
            },
            ..PreprocessConfig::default()
        };
        let svc = service(dir.path(), &["a"], config);
        let stats = svc.preprocess_and_split().unwrap();

        assert_eq!(stats.count(Split::Train), 30);
        assert_eq!(stats.failed, 1);
        let labels = files(&dir.path().join("processed/labels/train"));
        assert!(labels.contains("a_000000_aug_1"));
        assert_eq!(labels.len(), 30);
    }

    #[test]
    fn manifest_roundtrips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), &["plastic_bottle", "plastic_bag"], PreprocessConfig::default());
        let path = dir.path().join("data.yaml");
        svc.save_dataset_yaml(&path).unwrap();

        let manifest = load_manifest(&path).unwrap();
        assert_eq!(manifest, svc.manifest());
        assert_eq!(manifest.train, "images/train");
        assert!(matches!(load_manifest(&dir.path().join("nope.yaml")), Err(DomainError::NotFound(_))));
    }
}
