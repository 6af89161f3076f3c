use super::Detector;
use crate::error::Result;
use crate::types::{Alert, DetectionResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Primary detector with a fallback behind the same interface. Every
/// failover is logged at warn level so a persistent backend outage stays
/// visible to the operator.
pub struct FailoverDetector {
    primary: Arc<dyn Detector>,
    fallback: Arc<dyn Detector>,
}

impl FailoverDetector {
    pub fn new(primary: Arc<dyn Detector>, fallback: Arc<dyn Detector>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Detector for FailoverDetector {
    async fn detect(&self, camera_id: &str, image: &str) -> Result<DetectionResult> {
        match self.primary.detect(camera_id, image).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(
                    camera_id,
                    "detection backend unavailable, using simulated detector: {}", e
                );
                self.fallback.detect(camera_id, image).await
            }
        }
    }

    async fn fetch_alert_history(&self) -> Result<Vec<Alert>> {
        match self.primary.fetch_alert_history().await {
            Ok(alerts) => Ok(alerts),
            Err(e) => {
                warn!(
                    "alert backend unavailable, using simulated history: {}",
                    e
                );
                self.fallback.fetch_alert_history().await
            }
        }
    }
}
