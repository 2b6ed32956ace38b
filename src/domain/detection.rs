use serde::{Deserialize, Serialize};
use std::fmt;

/// Detección en coordenadas de píxel (esquinas), tal y como sale del detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
    pub label: String,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }

        let inter = (ix2 - ix1) * (iy2 - iy1);
        let union = self.area() + other.area() - inter;
        inter / union.max(1e-6)
    }

    /// Recorta la caja a los límites de la imagen.
    pub fn clipped(mut self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        self.x1 = self.x1.clamp(0.0, w);
        self.x2 = self.x2.clamp(0.0, w);
        self.y1 = self.y1.clamp(0.0, h);
        self.y2 = self.y2.clamp(0.0, h);
        self
    }

    /// Convierte a formato YOLO normalizado (centro, ancho, alto en [0, 1]).
    /// Devuelve `None` si las dimensiones de la imagen no son positivas.
    pub fn normalize(&self, width: u32, height: u32, class_id: usize) -> Option<NormalizedBox> {
        if width == 0 || height == 0 {
            return None;
        }
        let clipped = self.clone().clipped(width, height);
        let (w, h) = (width as f32, height as f32);
        Some(NormalizedBox {
            class_id,
            cx: (clipped.x1 + clipped.x2) / (2.0 * w),
            cy: (clipped.y1 + clipped.y2) / (2.0 * h),
            w: (clipped.x2 - clipped.x1).max(0.0) / w,
            h: (clipped.y2 - clipped.y1).max(0.0) / h,
        })
    }
}

/// Caja YOLO: una línea `<clase> <cx> <cy> <w> <h>` en el fichero de etiquetas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub class_id: usize,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl NormalizedBox {
    /// Caja que cubre la imagen completa.
    pub fn full_image(class_id: usize) -> Self {
        Self { class_id, cx: 0.5, cy: 0.5, w: 1.0, h: 1.0 }
    }

    pub fn is_normalized(&self) -> bool {
        [self.cx, self.cy, self.w, self.h].iter().all(|v| (0.0..=1.0).contains(v))
    }

    /// Inversa de `Detection::normalize`.
    pub fn to_pixels(&self, width: u32, height: u32, label: &str) -> Detection {
        let (w, h) = (width as f32, height as f32);
        Detection {
            x1: (self.cx - self.w / 2.0) * w,
            y1: (self.cy - self.h / 2.0) * h,
            x2: (self.cx + self.w / 2.0) * w,
            y2: (self.cy + self.h / 2.0) * h,
            score: 1.0,
            class_id: self.class_id,
            label: label.to_string(),
        }
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let class_id = parts.next()?.parse().ok()?;
        let mut next = || parts.next().and_then(|p| p.parse::<f32>().ok());
        Some(Self { class_id, cx: next()?, cy: next()?, w: next()?, h: next()? })
    }
}

impl fmt::Display for NormalizedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.6} {:.6} {:.6} {:.6}", self.class_id, self.cx, self.cy, self.w, self.h)
    }
}

/// Supresión de no-máximos por clase. Devuelve las detecciones ordenadas por score.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && k.iou(&det) > iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> Detection {
        Detection { x1, y1, x2, y2, score, class_id, label: String::new() }
    }

    #[test]
    fn normalize_uses_center_size_form() {
        let b = det(100.0, 50.0, 300.0, 150.0, 0.9, 0).normalize(400, 200, 2).unwrap();
        assert_eq!(b.class_id, 2);
        assert!((b.cx - 0.5).abs() < 1e-6);
        assert!((b.cy - 0.5).abs() < 1e-6);
        assert!((b.w - 0.5).abs() < 1e-6);
        assert!((b.h - 0.5).abs() < 1e-6);
    }

    #[test]
    fn normalized_values_stay_in_unit_range() {
        let dims = [(1u32, 1u32), (640, 480), (33, 1000)];
        for (w, h) in dims {
            let (fw, fh) = (w as f32, h as f32);
            let boxes = [
                det(0.0, 0.0, fw, fh, 1.0, 0),
                det(fw * 0.25, fh * 0.1, fw * 0.3, fh * 0.9, 1.0, 0),
                det(fw, fh, fw, fh, 1.0, 0),
                det(-5.0, -5.0, fw + 5.0, fh + 5.0, 1.0, 0),
            ];
            for d in boxes {
                let n = d.normalize(w, h, 0).unwrap();
                assert!(n.is_normalized(), "{n:?} for {w}x{h}");
            }
        }
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        assert!(det(0.0, 0.0, 1.0, 1.0, 1.0, 0).normalize(0, 10, 0).is_none());
    }

    #[test]
    fn label_line_format() {
        assert_eq!(NormalizedBox::full_image(3).to_string(), "3 0.500000 0.500000 1.000000 1.000000");
        let parsed = NormalizedBox::parse_line("1 0.25 0.5 0.1 0.2").unwrap();
        assert_eq!(parsed.class_id, 1);
        assert!((parsed.w - 0.1).abs() < 1e-6);
        assert!(NormalizedBox::parse_line("1 0.25").is_none());
    }

    #[test]
    fn nms_keeps_best_per_class() {
        let dets = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.6, 0),
            det(1.0, 1.0, 10.0, 10.0, 0.9, 0),
            det(1.0, 1.0, 10.0, 10.0, 0.8, 1),
            det(50.0, 50.0, 60.0, 60.0, 0.5, 0),
        ];
        let kept = non_max_suppression(dets, 0.45);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].class_id, 1);
    }
}
