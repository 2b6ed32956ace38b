use serde::{Deserialize, Serialize};

use crate::domain::detection::Detection;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsDto {
    pub health: String,
    pub predict: String,
    pub info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub endpoints: EndpointsDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String, // "healthy" | "unhealthy"
    pub model_loaded: bool,
    pub timestamp: f64, // segundos desde epoch
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub classes: Vec<String>,
    pub model_name: String,
    pub confidence_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BBoxDto {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionDto {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BBoxDto,
}

impl From<Detection> for DetectionDto {
    fn from(d: Detection) -> Self {
        Self {
            class_name: d.label,
            confidence: d.score,
            bbox: BBoxDto { x1: d.x1, y1: d.y1, x2: d.x2, y2: d.y2, confidence: d.score },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub detections: Vec<DetectionDto>,
    pub processing_time_ms: f64,
    pub image_size: [u32; 2], // [ancho, alto]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
