use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

use crate::adapters::http::state::AppContext;
use crate::application::dto::{EndpointsDto, ErrorResponse, HealthResponse, InfoResponse, RootResponse};

const ACCEPTED_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

/// Error HTTP con cuerpo `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl ApiError {
    fn model_not_loaded() -> Self {
        Self(StatusCode::SERVICE_UNAVAILABLE, "Model not loaded".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorResponse { detail: self.1 })).into_response()
    }
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        name: "Plastic Waste Detection API".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        endpoints: EndpointsDto {
            health: "/health/".into(),
            predict: "/predict/".into(),
            info: "/info/".into(),
        },
    })
}

pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let loaded = ctx.is_model_loaded();
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or_default();
    Json(HealthResponse {
        status: if loaded { "healthy" } else { "unhealthy" }.into(),
        model_loaded: loaded,
        timestamp,
    })
}

pub async fn info(State(ctx): State<AppContext>) -> Result<Json<InfoResponse>, ApiError> {
    if !ctx.is_model_loaded() {
        return Err(ApiError::model_not_loaded());
    }
    Ok(Json(InfoResponse {
        classes: ctx.classes.names().to_vec(),
        model_name: ctx.model_name.clone(),
        confidence_threshold: ctx.api.confidence_threshold,
    }))
}

pub async fn predict(
    State(ctx): State<AppContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let service = ctx.model().cloned().ok_or_else(ApiError::model_not_loaded)?;
    let mut multipart = multipart.map_err(|e| ApiError(e.status(), e.body_text()))?;

    let max_mb = ctx.api.max_file_size_mb;
    let too_large = || ApiError(StatusCode::PAYLOAD_TOO_LARGE, format!("File size exceeds {max_mb}MB limit"));

    let mut content = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError(e.status(), e.body_text()))? {
        if field.name() != Some("file") {
            continue;
        }
        if !field.content_type().is_some_and(|ct| ACCEPTED_TYPES.contains(&ct)) {
            return Err(ApiError(StatusCode::BAD_REQUEST, "File must be JPEG or PNG image".into()));
        }
        let bytes = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE { too_large() } else { ApiError(e.status(), e.body_text()) }
        })?;
        content = Some(bytes);
        break;
    }

    let Some(content) = content else {
        return Err(ApiError(StatusCode::UNPROCESSABLE_ENTITY, "Missing multipart field 'file'".into()));
    };
    if content.len() > ctx.api.max_upload_bytes() {
        warn!("Upload rejected: {} bytes", content.len());
        return Err(too_large());
    }

    let result = tokio::task::spawn_blocking(move || service.predict(&content))
        .await
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, format!("Prediction failed: {e}")))?;

    match result {
        Ok(prediction) => {
            info!(
                "Inference completed: {} detections in {:.2}ms",
                prediction.detections.len(),
                prediction.processing_time_ms
            );
            Ok(Json(prediction).into_response())
        }
        Err(e) => {
            error!("Prediction error: {}", e);
            Err(ApiError(StatusCode::INTERNAL_SERVER_ERROR, format!("Prediction failed: {e}")))
        }
    }
}
