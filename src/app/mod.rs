// App layer: wires the concrete adapters (vendor client, local storage) into the service.

use crate::config::storage::LocalStorage;
use crate::config::ProxyConfig;
use crate::core::debug::DebugRecorder;
use crate::core::retry::RetryPolicy;
use crate::core::service::DetectionService;
use crate::core::vendor::VendorClient;
use crate::utils::error::Result;

pub type ProxyService = DetectionService<VendorClient, LocalStorage>;

pub fn build_service(config: &ProxyConfig) -> Result<ProxyService> {
    let retry = RetryPolicy::from(&config.retry);
    let client = VendorClient::new(config.vendor.clone(), retry)?;

    let recorder = if config.debug.enabled {
        tracing::info!("🐞 Debug records will be written to {}", config.debug.directory);
        DebugRecorder::new(LocalStorage::new(&config.debug.directory))
    } else {
        DebugRecorder::disabled()
    };

    Ok(DetectionService::new(client, recorder, config.detection.clone()))
}
