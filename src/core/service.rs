use std::time::Instant;

use tracing::{error, info};

use crate::config::DetectionConfig;
use crate::core::data_url::parse_data_url;
use crate::core::debug::DebugRecorder;
use crate::core::normalize::normalize;
use crate::domain::model::{DetectRequest, DetectionResult};
use crate::domain::ports::{Detector, Storage};
use crate::utils::error::Result;

/// Validate → call the vendor → record → normalize.
pub struct DetectionService<D: Detector, S: Storage> {
    detector: D,
    recorder: DebugRecorder<S>,
    config: DetectionConfig,
}

impl<D: Detector, S: Storage> DetectionService<D, S> {
    pub fn new(detector: D, recorder: DebugRecorder<S>, config: DetectionConfig) -> Self {
        Self {
            detector,
            recorder,
            config,
        }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub async fn detect(&self, request_id: &str, request: &DetectRequest) -> Result<DetectionResult> {
        let started = Instant::now();

        // 驗證 (失敗時不會呼叫供應商)
        let image = parse_data_url(&request.image, &self.config)?;
        info!(
            request_id,
            mime_type = %image.mime_type,
            bytes = image.byte_len,
            "Forwarding image to vendor"
        );

        let vendor = match self.detector.infer(&image).await {
            Ok(vendor) => vendor,
            Err(e) => {
                error!(request_id, error = %e, "Vendor call failed");
                self.recorder.record(request_id, &image, None, Err(&e)).await;
                return Err(e);
            }
        };

        let outcome = normalize(&vendor.body, &self.config);
        match &outcome {
            Ok(result) => {
                self.recorder
                    .record(request_id, &image, Some(&vendor), Ok(result))
                    .await;
                info!(
                    request_id,
                    dogs = result.count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Detection completed"
                );
            }
            Err(e) => {
                error!(request_id, error = %e, "Could not normalize vendor response");
                self.recorder
                    .record(request_id, &image, Some(&vendor), Err(e))
                    .await;
            }
        }

        outcome
    }

    pub async fn ready(&self) -> bool {
        self.detector.health_check().await
    }
}
