use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::config::{ApiConfig, AutoLabelConfig, EvaluationConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelId {
    pub name: String,       // nombre lógico, p.ej. "yolov8n"
    pub onnx_path: PathBuf, // ruta en disco
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloParams {
    pub input_size: u32,        // 640 típico
    pub conf_threshold: f32,    // 0..1
    pub iou_threshold: f32,     // 0..1
    pub max_detections: usize,  // p.ej. 300
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

impl From<&AutoLabelConfig> for YoloParams {
    fn from(c: &AutoLabelConfig) -> Self {
        Self {
            input_size: c.img_size,
            conf_threshold: c.confidence_threshold,
            iou_threshold: c.iou_threshold,
            ..Self::default()
        }
    }
}

impl From<&EvaluationConfig> for YoloParams {
    fn from(c: &EvaluationConfig) -> Self {
        Self {
            input_size: c.img_size,
            conf_threshold: c.confidence_threshold,
            iou_threshold: c.iou_threshold,
            ..Self::default()
        }
    }
}

impl From<&ApiConfig> for YoloParams {
    fn from(c: &ApiConfig) -> Self {
        Self {
            input_size: c.img_size,
            conf_threshold: c.confidence_threshold,
            iou_threshold: c.iou_threshold,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub model: ModelId,
    pub params: YoloParams,
}
