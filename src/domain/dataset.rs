use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::detection::NormalizedBox;

/// Extensiones aceptadas como imagen en los directorios de datos crudos.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Lista ordenada de clases del proyecto. El índice es el id de clase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassList(Vec<String>);

impl ClassList {
    pub fn new(names: Vec<String>) -> Self { Self(names) }

    pub fn names(&self) -> &[String] { &self.0 }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|c| c == name)
    }

    /// Nombre a mostrar para un id del modelo: la clase del proyecto si existe,
    /// si no `class_<id>`.
    pub fn display_name(&self, class_id: usize) -> String {
        self.0.get(class_id).cloned().unwrap_or_else(|| format!("class_{class_id}"))
    }

    /// Asocia el nombre de una clase del detector (COCO) a una clase del proyecto.
    ///
    /// Primero prueba las palabras clave de cada clase (el nombre partido por `_`),
    /// en orden; gana la primera coincidencia. Después aplica las heurísticas
    /// de plásticos.
    pub fn closest_class(&self, detection_name: &str) -> Option<usize> {
        let detection = detection_name.to_lowercase();

        for (class_id, class_name) in self.0.iter().enumerate() {
            let hit = class_name
                .split('_')
                .filter(|k| !k.is_empty())
                .any(|k| detection.contains(&k.to_lowercase()));
            if hit {
                return Some(class_id);
            }
        }

        if detection.contains("bottle") {
            self.index_of("plastic_bottle")
        } else if detection.contains("bag") {
            self.index_of("plastic_bag")
        } else if detection.contains("plastic") || detection.contains("wrapper") {
            self.index_of("plastic_wrapper")
        } else {
            None
        }
    }
}

/// Imagen cruda con su clase implícita (el directorio del que procede).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub class_id: usize,
    pub class_name: String,
}

impl ImageRecord {
    /// Nombre de salida único dentro del dataset procesado: `<clase>_<stem>`.
    pub fn output_stem(&self) -> String {
        let stem = self.path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        format!("{}_{}", self.class_name, stem)
    }

    /// Etiqueta de imagen completa usada por el preprocesado.
    pub fn full_image_label(&self) -> NormalizedBox {
        NormalizedBox::full_image(self.class_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
}

/// Tamaños `(train, val, test)` con truncado entero; test se queda el resto.
pub fn split_counts(total: usize, ratios: SplitRatios) -> (usize, usize, usize) {
    let train = ((total as f64 * ratios.train) as usize).min(total);
    let val = ((total as f64 * ratios.val) as usize).min(total - train);
    (train, val, total - train - val)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSplit {
    pub train: Vec<ImageRecord>,
    pub val: Vec<ImageRecord>,
    pub test: Vec<ImageRecord>,
}

impl DatasetSplit {
    /// Baraja con una semilla fija y parte en train/val/test.
    /// El mismo conjunto de entrada y la misma semilla producen siempre el mismo reparto.
    pub fn partition(mut records: Vec<ImageRecord>, ratios: SplitRatios, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        records.shuffle(&mut rng);

        let (n_train, n_val, _) = split_counts(records.len(), ratios);
        let test = records.split_off(n_train + n_val);
        let val = records.split_off(n_train);
        Self { train: records, val, test }
    }

    pub fn get(&self, split: Split) -> &[ImageRecord] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }
}

/// Resultado del preprocesado: imágenes escritas por split y fallos.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SplitStats {
    pub images: BTreeMap<Split, usize>,
    pub failed: usize,
}

impl SplitStats {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn count(&self, split: Split) -> usize {
        self.images.get(&split).copied().unwrap_or(0)
    }
}

/// Manifiesto `data.yaml` de un dataset en formato YOLO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub path: PathBuf,
    pub train: String,
    pub val: String,
    pub test: String,
    pub nc: usize,
    pub names: BTreeMap<usize, String>,
}

impl DatasetManifest {
    pub fn new(root: &Path, classes: &ClassList) -> Self {
        Self {
            path: root.to_path_buf(),
            train: format!("images/{}", Split::Train),
            val: format!("images/{}", Split::Val),
            test: format!("images/{}", Split::Test),
            nc: classes.len(),
            names: classes.names().iter().cloned().enumerate().collect(),
        }
    }

    pub fn images_dir(&self, split: Split) -> PathBuf {
        let rel = match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        };
        self.path.join(rel)
    }

    /// Directorio de etiquetas paralelo: `images/<split>` → `labels/<split>`.
    pub fn labels_dir(&self, split: Split) -> PathBuf {
        self.path.join("labels").join(split.as_str())
    }

    pub fn class_list(&self) -> ClassList {
        ClassList::new(self.names.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn records(n: usize) -> Vec<ImageRecord> {
        (0..n)
            .map(|i| ImageRecord {
                path: PathBuf::from(format!("raw/c{}/{i:06}.jpg", i % 3)),
                class_id: i % 3,
                class_name: format!("c{}", i % 3),
            })
            .collect()
    }

    const RATIOS: SplitRatios = SplitRatios { train: 0.8, val: 0.1 };

    #[test]
    fn hundred_images_split_80_10_10() {
        let split = DatasetSplit::partition(records(100), RATIOS, 42);
        assert_eq!((split.train.len(), split.val.len(), split.test.len()), (80, 10, 10));
    }

    #[test]
    fn partition_is_disjoint_and_complete() {
        for n in [1, 2, 7, 10, 33, 101] {
            let input = records(n);
            let split = DatasetSplit::partition(input.clone(), SplitRatios { train: 0.7, val: 0.2 }, 7);

            let all: Vec<_> = split.train.iter().chain(&split.val).chain(&split.test).cloned().collect();
            let unique: BTreeSet<_> = all.iter().cloned().collect();
            assert_eq!(all.len(), n, "duplicados para n={n}");
            assert_eq!(unique, input.into_iter().collect::<BTreeSet<_>>());
        }
    }

    #[test]
    fn same_seed_same_split() {
        let a = DatasetSplit::partition(records(50), RATIOS, 1234);
        let b = DatasetSplit::partition(records(50), RATIOS, 1234);
        assert_eq!(a, b);
    }

    #[test]
    fn counts_truncate_and_give_remainder_to_test() {
        assert_eq!(split_counts(0, RATIOS), (0, 0, 0));
        assert_eq!(split_counts(9, RATIOS), (7, 0, 2));
        assert_eq!(split_counts(10, SplitRatios { train: 1.0, val: 0.0 }), (10, 0, 0));
    }

    #[test]
    fn closest_class_uses_keywords_then_fallbacks() {
        let classes = ClassList::new(vec![
            "plastic_bottle".into(),
            "plastic_bag".into(),
            "plastic_wrapper".into(),
        ]);
        // "plastic" aparece en las tres: gana la primera.
        assert_eq!(classes.closest_class("Plastic cup"), Some(0));
        assert_eq!(classes.closest_class("bottle"), Some(0));
        assert_eq!(classes.closest_class("handbag"), Some(1));
        assert_eq!(classes.closest_class("person"), None);

        let only_bags = ClassList::new(vec!["sack".into(), "plastic_bag".into()]);
        assert_eq!(only_bags.closest_class("wine glass"), None);
        assert_eq!(only_bags.closest_class("backpack"), None);
        assert_eq!(only_bags.closest_class("bag"), Some(1));
    }

    #[test]
    fn manifest_points_at_yolo_layout() {
        let classes = ClassList::new(vec!["a".into(), "b".into()]);
        let m = DatasetManifest::new(Path::new("data/processed"), &classes);
        assert_eq!(m.nc, 2);
        assert_eq!(m.images_dir(Split::Val), PathBuf::from("data/processed/images/val"));
        assert_eq!(m.labels_dir(Split::Test), PathBuf::from("data/processed/labels/test"));
        assert_eq!(m.names.get(&1).map(String::as_str), Some("b"));
    }

    #[test]
    fn output_stem_is_prefixed_with_class() {
        let r = &records(1)[0];
        assert_eq!(r.output_stem(), "c0_000000");
        assert!(has_image_extension(Path::new("x/Y.JPG")));
        assert!(!has_image_extension(Path::new("x/y.gif")));
    }
}
