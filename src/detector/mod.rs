use crate::config::{DetectionConfig, DetectionMode};
use crate::error::Result;
use crate::types::{Alert, DetectionResult};
use async_trait::async_trait;
use std::sync::Arc;

mod failover;
mod remote;
mod simulated;

pub use failover::FailoverDetector;
pub use remote::HttpDetector;
pub use simulated::{SimulatedDetector, OBJECT_WEIGHTS};

/// Object-detection boundary. The rest of the pipeline is indifferent to
/// whether the remote backend or the simulated stand-in answers.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Classify a captured still. `image` is a base64 JPEG data URL.
    async fn detect(&self, camera_id: &str, image: &str) -> Result<DetectionResult>;

    /// Fetch the backend's rolling alert log, newest first.
    async fn fetch_alert_history(&self) -> Result<Vec<Alert>>;
}

/// Build the detector selected by configuration. `camera_ids` seeds the
/// simulated alert history with realistic camera assignments.
pub fn build_detector(config: &DetectionConfig, camera_ids: Vec<String>) -> Arc<dyn Detector> {
    match config.mode {
        DetectionMode::Remote => Arc::new(HttpDetector::new(config)),
        DetectionMode::Simulated => Arc::new(SimulatedDetector::new(config, camera_ids)),
        DetectionMode::Auto => Arc::new(FailoverDetector::new(
            Arc::new(HttpDetector::new(config)),
            Arc::new(SimulatedDetector::new(config, camera_ids)),
        )),
    }
}
