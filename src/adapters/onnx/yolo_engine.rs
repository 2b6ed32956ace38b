use anyhow::{anyhow, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array4, ArrayViewD, Axis, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::application::ports::DetectorPort;
use crate::domain::detection::{non_max_suppression, Detection};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::YoloParams;

/// Nombres de las 80 clases COCO, en el orden de salida de los modelos preentrenados.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

pub fn coco_class_names() -> Vec<String> {
    COCO_CLASSES.iter().map(|s| s.to_string()).collect()
}

/// Motor YOLO sobre ONNX Runtime. Espera la salida `[1, 4 + nc, candidatos]`
/// de los modelos exportados por Ultralytics.
pub struct OnnxYoloEngine {
    // `Session::run` necesita acceso exclusivo.
    session: Mutex<Session>,
    class_names: Vec<String>,
}

impl OnnxYoloEngine {
    pub fn load(path: &Path, class_names: Vec<String>) -> Result<Self> {
        let mut builder = Session::builder()?.with_intra_threads(4)?;

        // CUDA es opcional: si está disponible se registra, si no continuamos en CPU.
        let cuda = CUDAExecutionProvider::default().build();
        if let Ok(builder_with_cuda) = builder.clone().with_execution_providers([cuda]) {
            builder = builder_with_cuda;
        }

        let model_bytes = fs::read(path)?;
        let session = builder.commit_from_memory(&model_bytes)?;

        tracing::info!("Modelo ONNX cargado: {} ({} clases)", path.display(), class_names.len());
        Ok(Self { session: Mutex::new(session), class_names })
    }

    pub fn infer(&self, rgb: &RgbImage, params: &YoloParams) -> Result<Vec<Detection>> {
        let imgsz = params.input_size as usize;
        let (raw, _) = to_nchw(rgb, imgsz).into_raw_vec_and_offset();
        let input_tensor = Value::from_array((vec![1, 3, imgsz as i64, imgsz as i64], raw))?;

        let mut session = self.session.lock().map_err(|_| anyhow!("sesión ONNX envenenada"))?;
        let outputs = session.run(ort::inputs![input_tensor])?;
        let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
        if dims.len() != 3 || dims[1] < 5 {
            return Err(anyhow!("salida YOLO inesperada: {:?}", dims));
        }
        let output = ArrayViewD::from_shape(IxDyn(&dims), data_out)?;
        let view = output.index_axis(Axis(0), 0);

        let scale = (rgb.width() as f32 / imgsz as f32, rgb.height() as f32 / imgsz as f32);
        let candidates = decode_candidates(view, scale, params.conf_threshold, &self.class_names);
        let clipped = candidates.into_iter().map(|d| d.clipped(rgb.width(), rgb.height())).collect();

        let kept = non_max_suppression(clipped, params.iou_threshold);
        Ok(kept.into_iter().take(params.max_detections).collect())
    }
}

/// Redimensiona a `imgsz`×`imgsz` y pasa a tensor NCHW en [0, 1].
fn to_nchw(rgb: &RgbImage, imgsz: usize) -> Array4<f32> {
    let resized = image::imageops::resize(rgb, imgsz as u32, imgsz as u32, FilterType::Triangle);
    let mut input = Array4::<f32>::zeros((1, 3, imgsz, imgsz));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    input
}

/// Decodifica la salida `[4 + nc, candidatos]` (cx, cy, w, h, scores...) a cajas en
/// píxeles de la imagen original. Se queda con la clase de mayor score por candidato.
fn decode_candidates(
    view: ArrayViewD<'_, f32>,
    (sx, sy): (f32, f32),
    conf_threshold: f32,
    class_names: &[String],
) -> Vec<Detection> {
    let mut detections = Vec::new();
    for i in 0..view.shape()[1] {
        let scores = view.slice(s![4.., i]);
        let Some((class_id, &score)) = scores
            .indexed_iter()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        else {
            continue;
        };
        if score < conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (view[[0, i]], view[[1, i]], view[[2, i]], view[[3, i]]);
        detections.push(Detection {
            x1: (cx - w / 2.0) * sx,
            y1: (cy - h / 2.0) * sy,
            x2: (cx + w / 2.0) * sx,
            y2: (cy + h / 2.0) * sy,
            score,
            class_id,
            label: class_names.get(class_id).cloned().unwrap_or_else(|| format!("class_{class_id}")),
        });
    }
    detections
}

impl DetectorPort for OnnxYoloEngine {
    fn detect(&self, image: &RgbImage, params: &YoloParams) -> DomainResult<Vec<Detection>> {
        self.infer(image, params)
            .map_err(|e| DomainError::OperationFailed(format!("inferencia fallida: {e}")))
    }
}
