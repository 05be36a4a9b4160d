pub mod data_url;
pub mod debug;
pub mod normalize;
pub mod retry;
pub mod service;
pub mod vendor;

pub use crate::domain::model::{DetectRequest, DetectionResult, ImagePayload, VendorResponse};
pub use crate::domain::ports::{Detector, Storage};
pub use crate::utils::error::Result;
