use super::Detector;
use crate::capture;
use crate::config::DetectionConfig;
use crate::error::{AlertFetchError, DetectionBackendError, Result};
use crate::types::{Alert, DetectionResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Client for the remote detection backend.
pub struct HttpDetector {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    camera_id: &'a str,
    image: &'a str,
    timestamp: DateTime<Utc>,
}

impl HttpDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, camera_id: &str, image: &str) -> Result<DetectionResult> {
        let url = format!("{}/detect", self.base_url);
        let body = DetectRequest {
            camera_id,
            // the backend expects the raw base64 payload, not the data URL
            image: capture::data_url_payload(image),
            timestamp: Utc::now(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(DetectionBackendError::Transport)?;

        if !response.status().is_success() {
            return Err(DetectionBackendError::Status {
                status: response.status().as_u16(),
            }
            .into());
        }

        let result: DetectionResult = response
            .json()
            .await
            .map_err(DetectionBackendError::Transport)?;
        debug!(camera_id, detected = result.detected, "detection response");
        Ok(result)
    }

    async fn fetch_alert_history(&self) -> Result<Vec<Alert>> {
        let url = format!("{}/alerts", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(AlertFetchError::Transport)?;

        if !response.status().is_success() {
            return Err(AlertFetchError::Status {
                status: response.status().as_u16(),
            }
            .into());
        }

        let alerts: Vec<Alert> = response.json().await.map_err(AlertFetchError::Transport)?;
        debug!(count = alerts.len(), "alert history fetched");
        Ok(alerts)
    }
}
