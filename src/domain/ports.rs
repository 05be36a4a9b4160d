use crate::domain::model::{ImagePayload, VendorResponse};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 實際執行偵測的外部服務
#[async_trait]
pub trait Detector: Send + Sync {
    async fn infer(&self, image: &ImagePayload) -> Result<VendorResponse>;

    async fn health_check(&self) -> bool {
        true
    }
}
