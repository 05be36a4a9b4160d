//! Request handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::RequestId;
use crate::api::state::AppState;
use crate::domain::model::{DetectRequest, DetectionResult};
use crate::domain::ports::{Detector, Storage};

/// Forward an image to the vendor and return the normalized detections.
pub async fn detect<D, S>(
    State(state): State<AppState<D, S>>,
    request_id: Option<Extension<RequestId>>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> ApiResult<Json<DetectionResult>>
where
    D: Detector + 'static,
    S: Storage + 'static,
{
    let Json(request) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::bad_request(rejection.body_text())
        }
    })?;

    let request_id = request_id
        .map(|Extension(RequestId(id))| id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let result = state.service.detect(&request_id, &request).await?;
    Ok(Json(result))
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check endpoint: asks the vendor health endpoint when one is configured.
pub async fn ready<D, S>(State(state): State<AppState<D, S>>) -> ApiResult<Json<serde_json::Value>>
where
    D: Detector + 'static,
    S: Storage + 'static,
{
    if state.service.ready().await {
        Ok(Json(serde_json::json!({ "status": "ready" })))
    } else {
        Err(ApiError::ServiceUnavailable("vendor API is not healthy".to_string()))
    }
}
