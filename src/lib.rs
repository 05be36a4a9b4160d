pub mod api;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use api::{create_router, AppState};
pub use app::{build_service, ProxyService};
pub use config::{storage::LocalStorage, CliArgs, ProxyConfig};
pub use core::{service::DetectionService, vendor::VendorClient};
pub use domain::model::{BoundingBox, DetectRequest, DetectedDog, DetectionResult};
pub use utils::error::{ProxyError, Result};
