//! Vendor inference API client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use tracing::{debug, warn};

use crate::config::{PayloadFormat, VendorConfig};
use crate::core::retry::RetryPolicy;
use crate::domain::model::{ImagePayload, VendorResponse};
use crate::domain::ports::Detector;
use crate::utils::error::{ProxyError, Result};

/// 錯誤訊息中保留的供應商回應長度上限
const MAX_ERROR_BODY: usize = 1024;

pub struct VendorClient {
    http: Client,
    config: VendorConfig,
    retry: RetryPolicy,
}

impl VendorClient {
    pub fn new(config: VendorConfig, retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ProxyError::InvalidConfigValueError {
                    field: "vendor.headers".to_string(),
                    value: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ProxyError::InvalidConfigValueError {
                    field: format!("vendor.headers.{}", name),
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
            headers.insert(name, value);
        }

        let http = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self { http, config, retry })
    }

    pub fn config(&self) -> &VendorConfig {
        &self.config
    }

    fn build_request(&self, image: &ImagePayload) -> RequestBuilder {
        let mut request = self.http.post(&self.config.endpoint);

        match (&self.config.api_key, &self.config.api_key_param) {
            (Some(key), Some(param)) => request = request.query(&[(param.as_str(), key.as_str())]),
            (Some(key), None) => request = request.bearer_auth(key),
            _ => {}
        }

        match self.config.payload {
            PayloadFormat::Json => {
                let mut body = serde_json::Map::new();
                for (key, value) in &self.config.extra_fields {
                    body.insert(key.clone(), value.clone());
                }
                body.insert(
                    self.config.image_field.clone(),
                    serde_json::Value::String(image.base64.clone()),
                );
                request.json(&body)
            }
            PayloadFormat::Base64Body => request
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(image.base64.clone()),
        }
    }

    async fn attempt(&self, image: &ImagePayload) -> Result<VendorResponse> {
        let response = self.build_request(image).send().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::UpstreamTimeout { attempts: 1 }
            } else {
                ProxyError::UpstreamUnavailable(e)
            }
        })?;

        let status = response.status();
        debug!("Vendor response status: {}", status);

        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Failed to read vendor error body: {}", e);
                    String::new()
                }
            };
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::UpstreamTimeout { attempts: 1 }
            } else {
                ProxyError::UpstreamUnavailable(e)
            }
        })?;

        let body = serde_json::from_str(&text).map_err(|e| {
            ProxyError::invalid_response(format!(
                "vendor body is not JSON ({}): {}",
                e,
                truncate(&text, 200)
            ))
        })?;

        Ok(VendorResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Detector for VendorClient {
    async fn infer(&self, image: &ImagePayload) -> Result<VendorResponse> {
        debug!(
            "Sending {} ({} bytes) to {}",
            image.mime_type, image.byte_len, self.config.endpoint
        );
        self.retry.run(|_| self.attempt(image)).await
    }

    async fn health_check(&self) -> bool {
        let Some(url) = &self.config.health_endpoint else {
            return true;
        };

        match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Vendor health check failed: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Vendor health check error: {}", e);
                false
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn image() -> ImagePayload {
        ImagePayload {
            mime_type: "image/jpeg".to_string(),
            base64: "aGVsbG8gZG9nIQ==".to_string(),
            byte_len: 10,
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn config(server: &MockServer) -> VendorConfig {
        VendorConfig {
            endpoint: server.url("/infer"),
            ..VendorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_json_payload_with_bearer_key() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/infer")
                .header("Authorization", "Bearer secret")
                .json_body(serde_json::json!({
                    "image": "aGVsbG8gZG9nIQ==",
                    "model": "dogs-v2"
                }));
            then.status(200).json_body(serde_json::json!({"predictions": []}));
        });

        let mut cfg = config(&server);
        cfg.api_key = Some("secret".to_string());
        cfg.extra_fields
            .insert("model".to_string(), serde_json::json!("dogs-v2"));
        let client = VendorClient::new(cfg, fast_retry(1)).unwrap();

        let response = client.infer(&image()).await.unwrap();

        api_mock.assert();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["predictions"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_base64_body_with_query_key_and_custom_header() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/infer")
                .query_param("api_key", "k123")
                .header("Content-Type", "application/x-www-form-urlencoded")
                .header("X-Client", "dog-proxy")
                .body("aGVsbG8gZG9nIQ==");
            then.status(200).json_body(serde_json::json!([]));
        });

        let mut cfg = config(&server);
        cfg.payload = PayloadFormat::Base64Body;
        cfg.api_key = Some("k123".to_string());
        cfg.api_key_param = Some("api_key".to_string());
        cfg.headers
            .insert("X-Client".to_string(), "dog-proxy".to_string());
        let client = VendorClient::new(cfg, fast_retry(1)).unwrap();

        client.infer(&image()).await.unwrap();
        api_mock.assert();
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_returned() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST).path("/infer");
            then.status(503).body("overloaded");
        });

        let client = VendorClient::new(config(&server), fast_retry(3)).unwrap();
        let err = client.infer(&image()).await.unwrap_err();

        api_mock.assert_hits(3);
        match err {
            ProxyError::Upstream { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST).path("/infer");
            then.status(403).body("bad key");
        });

        let client = VendorClient::new(config(&server), fast_retry(3)).unwrap();
        let err = client.infer(&image()).await.unwrap_err();

        api_mock.assert_hits(1);
        assert!(matches!(err, ProxyError::Upstream { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_non_json_body_is_invalid_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/infer");
            then.status(200).body("<html>oops</html>");
        });

        let client = VendorClient::new(config(&server), fast_retry(2)).unwrap();
        let err = client.infer(&image()).await.unwrap_err();
        assert!(matches!(err, ProxyError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_slow_vendor_times_out() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/infer");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(serde_json::json!([]));
        });

        let mut cfg = config(&server);
        cfg.timeout_seconds = 1;
        let client = VendorClient::new(cfg, fast_retry(2)).unwrap();
        let err = client.infer(&image()).await.unwrap_err();

        assert!(matches!(err, ProxyError::UpstreamTimeout { attempts: 2 }));
    }

    #[tokio::test]
    async fn test_unreachable_vendor() {
        let cfg = VendorConfig {
            endpoint: "http://127.0.0.1:1/infer".to_string(),
            ..VendorConfig::default()
        };
        let client = VendorClient::new(cfg, fast_retry(2)).unwrap();
        let err = client.infer(&image()).await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnavailable(_)));
    }

    /// 供應商接受連線後直接斷線，每次嘗試都應重新連線
    #[tokio::test]
    async fn test_dropped_connections_are_retried() {
        use std::io::Read;
        use std::net::TcpListener;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                drop(stream);
            }
        });

        let cfg = VendorConfig {
            endpoint: format!("http://{}/infer", addr),
            ..VendorConfig::default()
        };
        let client = VendorClient::new(cfg, fast_retry(3)).unwrap();
        let err = client.infer(&image()).await.unwrap_err();

        assert!(matches!(err, ProxyError::UpstreamUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(200);
        });

        let mut cfg = config(&server);
        assert!(VendorClient::new(cfg.clone(), fast_retry(1)).unwrap().health_check().await);

        cfg.health_endpoint = Some(server.url("/health"));
        assert!(VendorClient::new(cfg.clone(), fast_retry(1)).unwrap().health_check().await);

        cfg.health_endpoint = Some(server.url("/missing"));
        assert!(!VendorClient::new(cfg, fast_retry(1)).unwrap().health_check().await);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("狗狗狗", 4), "狗…");
    }
}
