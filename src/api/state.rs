//! Application state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::service::DetectionService;
use crate::domain::ports::{Detector, Storage};

/// Shared application state.
pub struct AppState<D: Detector, S: Storage> {
    pub service: Arc<DetectionService<D, S>>,
    pub server: Arc<ServerConfig>,
}

impl<D: Detector, S: Storage> AppState<D, S> {
    pub fn new(service: DetectionService<D, S>, server: ServerConfig) -> Self {
        Self {
            service: Arc::new(service),
            server: Arc::new(server),
        }
    }
}

// derive(Clone) 會要求 D、S 也實作 Clone
impl<D: Detector, S: Storage> Clone for AppState<D, S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            server: Arc::clone(&self.server),
        }
    }
}
