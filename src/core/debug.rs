use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::model::{DetectionResult, ImagePayload, VendorResponse};
use crate::domain::ports::Storage;
use crate::utils::error::ProxyError;

/// One dumped exchange with the vendor. Image bytes are never written.
#[derive(Debug, Serialize)]
pub struct DebugRecord<'a> {
    pub request_id: &'a str,
    pub recorded_at: String,
    pub mime_type: &'a str,
    pub image_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_body: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'a DetectionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 把每次與供應商的往來寫入 Storage，寫入失敗只記錄警告
pub struct DebugRecorder<S: Storage> {
    storage: Option<S>,
}

impl<S: Storage> DebugRecorder<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage: Some(storage),
        }
    }

    pub fn disabled() -> Self {
        Self { storage: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.storage.is_some()
    }

    pub async fn record(
        &self,
        request_id: &str,
        image: &ImagePayload,
        vendor: Option<&VendorResponse>,
        outcome: std::result::Result<&DetectionResult, &ProxyError>,
    ) {
        let Some(storage) = &self.storage else {
            return;
        };

        let now = Utc::now();
        let record = DebugRecord {
            request_id,
            recorded_at: now.to_rfc3339(),
            mime_type: &image.mime_type,
            image_bytes: image.byte_len,
            vendor_status: vendor.map(|v| v.status),
            vendor_body: vendor.map(|v| &v.body),
            result: outcome.ok(),
            error: outcome.err().map(|e| e.to_string()),
        };

        let file_name = format!("{}-{}.json", now.format("%Y%m%dT%H%M%S%.3fZ"), sanitize(request_id));

        let data = match serde_json::to_vec_pretty(&record) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to serialize debug record {}: {}", file_name, e);
                return;
            }
        };

        match storage.write_file(&file_name, &data).await {
            Ok(()) => debug!("Debug record written: {}", file_name),
            Err(e) => warn!("Failed to write debug record {}: {}", file_name, e),
        }
    }
}

/// 只保留檔名安全的字元，request id 可能來自外部 header
fn sanitize(request_id: &str) -> String {
    let cleaned: String = request_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "request".to_string()
    } else {
        cleaned
    }
}
