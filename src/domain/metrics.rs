use serde::{Deserialize, Serialize};

use super::detection::Detection;

/// Métricas de evaluación persistidas en `metrics.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(rename = "mAP50")]
    pub map50: Option<f64>,
    #[serde(rename = "mAP50_95")]
    pub map50_95: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
}

impl Metrics {
    /// Pares `(clave, valor)` en el orden del informe.
    pub fn entries(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("mAP50", self.map50),
            ("mAP50_95", self.map50_95),
            ("precision", self.precision),
            ("recall", self.recall),
        ]
    }
}

/// Resultado de una etapa delegada: `{"status":"success", ...}` o
/// `{"status":"failed","error":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StageOutcome<T> {
    Success(T),
    Failed { error: String },
}

impl<T> StageOutcome<T> {
    pub fn failed(error: impl ToString) -> Self {
        StageOutcome::Failed { error: error.to_string() }
    }
}

/// Predicciones y verdad terreno de una imagen, ambas en píxeles.
#[derive(Debug, Clone, Default)]
pub struct ImageEval {
    pub predictions: Vec<Detection>,
    pub ground_truth: Vec<Detection>,
}

/// Umbrales IoU 0.50:0.05:0.95 usados para mAP50-95.
pub fn coco_iou_thresholds() -> Vec<f32> {
    (0..10).map(|i| 0.5 + 0.05 * i as f32).collect()
}

struct ClassMatches {
    /// `(score, es_verdadero_positivo)` de cada predicción de la clase.
    hits: Vec<(f32, bool)>,
    num_gt: usize,
}

/// Empareja predicciones con la verdad terreno de una clase a un umbral IoU dado.
/// Cada caja real se usa como mucho una vez; las predicciones se recorren por
/// score descendente.
fn match_class(images: &[ImageEval], class_id: usize, iou_threshold: f32) -> ClassMatches {
    let mut hits = Vec::new();
    let mut num_gt = 0;

    for image in images {
        let gts: Vec<&Detection> = image.ground_truth.iter().filter(|g| g.class_id == class_id).collect();
        num_gt += gts.len();

        let mut preds: Vec<&Detection> = image.predictions.iter().filter(|p| p.class_id == class_id).collect();
        preds.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut used = vec![false; gts.len()];
        for pred in preds {
            let best = gts
                .iter()
                .enumerate()
                .filter(|(i, _)| !used[*i])
                .map(|(i, g)| (i, pred.iou(g)))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

            match best {
                Some((i, iou)) if iou >= iou_threshold => {
                    used[i] = true;
                    hits.push((pred.score, true));
                }
                _ => hits.push((pred.score, false)),
            }
        }
    }

    ClassMatches { hits, num_gt }
}

/// Average precision con interpolación en todos los puntos.
fn average_precision(mut m: ClassMatches) -> f64 {
    if m.num_gt == 0 {
        return 0.0;
    }
    m.hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut recall = vec![0.0];
    let mut precision = vec![1.0];
    let (mut tp, mut fp) = (0usize, 0usize);
    for (_, is_tp) in &m.hits {
        if *is_tp { tp += 1 } else { fp += 1 }
        recall.push(tp as f64 / m.num_gt as f64);
        precision.push(tp as f64 / (tp + fp) as f64);
    }

    // Envolvente monótona decreciente de la precisión.
    for i in (0..precision.len() - 1).rev() {
        precision[i] = precision[i].max(precision[i + 1]);
    }

    recall
        .windows(2)
        .zip(precision.iter().skip(1))
        .map(|(r, p)| (r[1] - r[0]) * p)
        .sum()
}

/// Calcula precisión, recall (IoU 0.5), mAP50 y mAP50-95 sobre las clases con
/// al menos una caja real. Sin cajas reales todas las métricas son `None`.
pub fn compute_metrics(images: &[ImageEval], num_classes: usize) -> Metrics {
    let classes: Vec<usize> = (0..num_classes)
        .filter(|c| images.iter().any(|im| im.ground_truth.iter().any(|g| g.class_id == *c)))
        .collect();
    if classes.is_empty() {
        return Metrics::default();
    }

    let mean_ap = |iou: f32| -> f64 {
        classes.iter().map(|c| average_precision(match_class(images, *c, iou))).sum::<f64>() / classes.len() as f64
    };

    let (mut tp, mut pred_total, mut gt_total) = (0usize, 0usize, 0usize);
    for c in &classes {
        let m = match_class(images, *c, 0.5);
        tp += m.hits.iter().filter(|(_, t)| *t).count();
        pred_total += m.hits.len();
        gt_total += m.num_gt;
    }

    let thresholds = coco_iou_thresholds();
    let map50_95 = thresholds.iter().map(|t| mean_ap(*t)).sum::<f64>() / thresholds.len() as f64;

    Metrics {
        map50: Some(mean_ap(0.5)),
        map50_95: Some(map50_95),
        precision: Some(if pred_total == 0 { 0.0 } else { tp as f64 / pred_total as f64 }),
        recall: Some(tp as f64 / gt_total as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> Detection {
        Detection { x1, y1, x2, y2, score, class_id, label: String::new() }
    }

    #[test]
    fn perfect_predictions_score_one() {
        let gt = vec![bx(0.0, 0.0, 10.0, 10.0, 1.0, 0), bx(20.0, 20.0, 40.0, 40.0, 1.0, 1)];
        let images = vec![ImageEval { predictions: gt.clone(), ground_truth: gt }];
        let m = compute_metrics(&images, 2);
        assert_eq!(m.precision, Some(1.0));
        assert_eq!(m.recall, Some(1.0));
        assert!((m.map50.unwrap() - 1.0).abs() < 1e-9);
        assert!((m.map50_95.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missed_and_false_detections_lower_scores() {
        let images = vec![
            ImageEval {
                predictions: vec![bx(0.0, 0.0, 10.0, 10.0, 0.9, 0), bx(50.0, 50.0, 60.0, 60.0, 0.8, 0)],
                ground_truth: vec![bx(0.0, 0.0, 10.0, 10.0, 1.0, 0)],
            },
            ImageEval { predictions: vec![], ground_truth: vec![bx(0.0, 0.0, 5.0, 5.0, 1.0, 0)] },
        ];
        let m = compute_metrics(&images, 1);
        assert_eq!(m.precision, Some(0.5));
        assert_eq!(m.recall, Some(0.5));
        assert!((m.map50.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn no_ground_truth_gives_empty_metrics() {
        let images = vec![ImageEval { predictions: vec![bx(0.0, 0.0, 1.0, 1.0, 0.9, 0)], ground_truth: vec![] }];
        assert_eq!(compute_metrics(&images, 3), Metrics::default());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let failed: StageOutcome<Metrics> = StageOutcome::failed("Model not found");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "Model not found");

        let ok = StageOutcome::Success(Metrics { map50: Some(0.7), ..Metrics::default() });
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["mAP50"], 0.7);
    }
}
