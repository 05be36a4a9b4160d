//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::utils::error::ProxyError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Vendor API returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            // 供應商的 4xx/5xx 原樣轉給呼叫端
            ApiError::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 回給呼叫端的訊息；production 環境不揭露內部錯誤與供應商回應內容
    fn detail(&self, production: bool) -> String {
        match self {
            ApiError::Internal(_) if production => "An internal error occurred".to_string(),
            ApiError::Upstream { status, .. } if production => {
                format!("Vendor API returned {}", status)
            }
            _ => self.to_string(),
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::InvalidImage { message } => ApiError::BadRequest(message),
            ProxyError::Upstream { status, body } => ApiError::Upstream { status, body },
            ProxyError::UpstreamTimeout { .. } => ApiError::GatewayTimeout(err.to_string()),
            ProxyError::UpstreamUnavailable(_) | ProxyError::InvalidResponse { .. } => {
                ApiError::BadGateway(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream_status: Option<u16>,
}

fn is_production() -> bool {
    std::env::var("ENVIRONMENT")
        .map(|v| v.eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(status = %status, "{}", self);
        }

        let detail = self.detail(is_production());

        let upstream_status = match &self {
            ApiError::Upstream { status, .. } => Some(*status),
            _ => None,
        };

        (status, Json(ErrorResponse { detail, upstream_status })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_errors_map_to_statuses() {
        let cases = vec![
            (ProxyError::invalid_image("bad"), StatusCode::BAD_REQUEST),
            (
                ProxyError::Upstream { status: 429, body: String::new() },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ProxyError::Upstream { status: 503, body: String::new() },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ProxyError::UpstreamTimeout { attempts: 3 }, StatusCode::GATEWAY_TIMEOUT),
            (ProxyError::invalid_response("html"), StatusCode::BAD_GATEWAY),
            (
                ProxyError::ConfigError { message: "x".into() },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_odd_upstream_status_becomes_bad_gateway() {
        let err = ApiError::Upstream { status: 302, body: String::new() };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_error_body_carries_upstream_status() {
        let response = ApiError::Upstream {
            status: 404,
            body: "model not found".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["upstream_status"], 404);
        assert!(json["detail"].as_str().unwrap().contains("404"));
    }

    #[test]
    fn test_production_hides_internal_and_vendor_details() {
        let internal = ApiError::Internal("db password is hunter2".to_string());
        assert_eq!(internal.detail(true), "An internal error occurred");
        assert!(internal.detail(false).contains("hunter2"));

        let upstream = ApiError::Upstream {
            status: 500,
            body: "stack trace at vendor.py:12".to_string(),
        };
        assert_eq!(upstream.detail(true), "Vendor API returned 500");
        assert!(upstream.detail(false).contains("vendor.py"));

        // 用戶端錯誤訊息在 production 仍保留
        let bad = ApiError::bad_request("image payload is empty");
        assert_eq!(bad.detail(true), bad.detail(false));
    }
}
