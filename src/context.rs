use crate::alerts::{self, AlertStore};
use crate::config::SentrycamConfig;
use crate::detector::{self, Detector};
use crate::error::Result;
use crate::manager::CameraManager;
use crate::session::{Role, Session};
use crate::stream::{DeviceRegistry, SyntheticVideoDevice, VideoDevice};
use crate::types::{display_name, Alert, Camera, CameraStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Aggregate figures for the analytics panel. Exposed only to an
/// authenticated admin session.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total_detections: u64,
    pub total_cameras: usize,
    /// Cameras currently active or in alert.
    pub active_cameras: usize,
    pub alert_cameras: usize,
    pub uptime_minutes: u64,
    /// Alert counts keyed by operator-facing object name.
    pub alerts_by_type: HashMap<String, usize>,
    pub busiest_camera: Option<String>,
}

/// Owned application context: the single entry point the presentation
/// layer talks to. Replaces ambient module state with an explicit
/// `init()`/`dispose()` lifecycle.
pub struct SentrycamContext {
    config: SentrycamConfig,
    manager: Arc<CameraManager>,
    alerts: Arc<AlertStore>,
    detector: Arc<dyn Detector>,
    poller: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    started_at: Instant,
}

impl SentrycamContext {
    pub fn new(config: SentrycamConfig) -> Self {
        Self::with_device(config, Arc::new(SyntheticVideoDevice::default()))
    }

    pub fn with_device(config: SentrycamConfig, device: Arc<dyn VideoDevice>) -> Self {
        let camera_ids = config.cameras.iter().map(|c| c.id.clone()).collect();
        let detector = detector::build_detector(&config.detection, camera_ids);
        Self::with_detector(config, device, detector)
    }

    /// Fully injected constructor; the seam tests use to script detections.
    pub fn with_detector(
        config: SentrycamConfig,
        device: Arc<dyn VideoDevice>,
        detector: Arc<dyn Detector>,
    ) -> Self {
        let cameras: Vec<Camera> = config
            .cameras
            .iter()
            .map(|def| Camera::new(def.id.clone(), def.name.clone(), def.device.clone()))
            .collect();

        let alerts = Arc::new(AlertStore::new(config.alerts.max_entries));
        let devices = Arc::new(DeviceRegistry::new(device));
        let manager = CameraManager::new(
            cameras,
            devices,
            Arc::clone(&detector),
            Arc::clone(&alerts),
            config.capture.clone(),
            config.lifecycle.clone(),
        );

        Self {
            config,
            manager,
            alerts,
            detector,
            poller: Mutex::new(None),
            cancel: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    /// Start background work: the alert poller's first tick fires
    /// immediately, which doubles as the initial alert load.
    pub fn init(&self) {
        let handle = alerts::spawn_alert_poller(
            Arc::clone(&self.detector),
            Arc::clone(&self.alerts),
            Duration::from_secs(self.config.alerts.poll_interval_seconds),
            self.cancel.child_token(),
        );
        *self.poller.lock() = Some(handle);
        info!("sentrycam context initialized");
    }

    /// Tear everything down: poller, capture timers, reversion timers,
    /// camera streams.
    pub fn dispose(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
        self.manager.dispose();
        info!("sentrycam context disposed");
    }

    // Read surface consumed by the presentation layer.

    pub fn cameras(&self) -> Vec<Camera> {
        self.manager.cameras()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.alerts()
    }

    pub fn total_detections(&self) -> u64 {
        self.alerts.total_detections()
    }

    pub fn uptime_minutes(&self) -> u64 {
        self.started_at.elapsed().as_secs() / 60
    }

    // Commands.

    pub async fn start_camera(&self, camera_id: &str) -> Result<()> {
        self.manager.start(camera_id).await
    }

    pub fn stop_camera(&self, camera_id: &str) -> Result<()> {
        self.manager.stop(camera_id)
    }

    pub async fn capture_image(&self, camera_id: &str) -> Result<String> {
        self.manager.capture_image(camera_id).await
    }

    /// On-demand refresh of the alert log, outside the poll cadence.
    pub async fn refresh_alerts(&self) -> Result<()> {
        let alerts = self.detector.fetch_alert_history().await?;
        self.alerts.replace_from_fetch(alerts);
        Ok(())
    }

    /// Aggregate analytics, gated on an authenticated admin session.
    pub fn analytics(&self, session: &Session) -> Option<AnalyticsSummary> {
        if !session.authenticated || session.role != Role::Admin {
            return None;
        }

        let cameras = self.manager.cameras();
        let alerts = self.alerts.alerts();

        let mut alerts_by_type: HashMap<String, usize> = HashMap::new();
        let mut by_camera: HashMap<String, usize> = HashMap::new();
        for alert in &alerts {
            *alerts_by_type
                .entry(display_name(&alert.object_type).to_string())
                .or_default() += 1;
            *by_camera.entry(alert.camera_id.clone()).or_default() += 1;
        }
        let busiest_camera = by_camera
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(camera_id, _)| camera_id);

        Some(AnalyticsSummary {
            total_detections: self.alerts.total_detections(),
            total_cameras: cameras.len(),
            active_cameras: cameras
                .iter()
                .filter(|c| c.status != CameraStatus::Inactive)
                .count(),
            alert_cameras: cameras
                .iter()
                .filter(|c| c.status == CameraStatus::Alert)
                .count(),
            uptime_minutes: self.uptime_minutes(),
            alerts_by_type,
            busiest_camera,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectionConfig, DetectionMode};
    use crate::types::{BoundingBox, CameraStatus, DetectionResult};
    use async_trait::async_trait;

    struct AlwaysKnife;

    #[async_trait]
    impl Detector for AlwaysKnife {
        async fn detect(
            &self,
            camera_id: &str,
            _image: &str,
        ) -> crate::error::Result<DetectionResult> {
            Ok(DetectionResult {
                detected: true,
                alert_id: None,
                object_type: Some("knife".to_string()),
                confidence: Some(0.9),
                timestamp: None,
                message: Some(format!("Detected suspicious knife at camera {camera_id}")),
                bounding_box: Some(BoundingBox {
                    x: 0.1,
                    y: 0.1,
                    width: 0.3,
                    height: 0.1,
                }),
                all_detections: None,
            })
        }

        async fn fetch_alert_history(&self) -> crate::error::Result<Vec<Alert>> {
            Ok(Vec::new())
        }
    }

    fn simulated_config() -> SentrycamConfig {
        let mut config = SentrycamConfig::default();
        config.detection = DetectionConfig {
            mode: DetectionMode::Simulated,
            seed: Some(42),
            ..DetectionConfig::default()
        };
        config.lifecycle.alert_dwell_seconds = 5;
        config
    }

    fn knife_context() -> SentrycamContext {
        SentrycamContext::with_detector(
            simulated_config(),
            Arc::new(SyntheticVideoDevice::new((32, 24))),
            Arc::new(AlwaysKnife),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_knife_detection_scenario() {
        let ctx = knife_context();

        ctx.start_camera("cam-1").await.unwrap();
        let detections_before = ctx.total_detections();

        ctx.capture_image("cam-1").await.unwrap();

        let camera = ctx
            .cameras()
            .into_iter()
            .find(|c| c.id == "cam-1")
            .unwrap();
        assert_eq!(camera.status, CameraStatus::Alert);

        let log = ctx.alerts();
        assert_eq!(log[0].camera_id, "cam-1");
        assert_eq!(log[0].object_type, "knife");
        assert_eq!(ctx.total_detections(), detections_before + 1);

        // dwell elapses: back to active with detections cleared
        tokio::time::sleep(Duration::from_secs(6)).await;
        let camera = ctx
            .cameras()
            .into_iter()
            .find(|c| c.id == "cam-1")
            .unwrap();
        assert_eq!(camera.status, CameraStatus::Active);
        assert!(camera.detected_objects.is_empty());

        ctx.dispose();
    }

    #[tokio::test(start_paused = true)]
    async fn init_loads_alerts_and_dispose_stops_cameras() {
        let ctx = SentrycamContext::new(simulated_config());
        ctx.init();

        // the poller's immediate first tick populates the log
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!ctx.alerts().is_empty());

        ctx.start_camera("cam-1").await.unwrap();
        ctx.start_camera("cam-2").await.unwrap();

        ctx.dispose();
        for camera in ctx.cameras() {
            assert_eq!(camera.status, CameraStatus::Inactive);
            assert!(camera.stream.is_none());
        }
    }

    #[tokio::test]
    async fn refresh_alerts_replaces_log_on_demand() {
        let ctx = SentrycamContext::new(simulated_config());
        assert!(ctx.alerts().is_empty());

        ctx.refresh_alerts().await.unwrap();
        let count = ctx.alerts().len();
        assert!((5..=15).contains(&count));
        assert_eq!(ctx.total_detections(), count as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn analytics_gated_by_role() {
        let ctx = knife_context();
        ctx.start_camera("cam-1").await.unwrap();
        ctx.capture_image("cam-1").await.unwrap();

        assert!(ctx.analytics(&Session::anonymous()).is_none());
        assert!(ctx.analytics(&Session::operator()).is_none());

        let summary = ctx.analytics(&Session::admin()).unwrap();
        assert_eq!(summary.total_cameras, 4);
        assert_eq!(summary.active_cameras, 1);
        assert_eq!(summary.alert_cameras, 1);
        assert_eq!(summary.total_detections, 1);
        assert_eq!(summary.alerts_by_type.get("Knife"), Some(&1));
        assert_eq!(summary.busiest_camera.as_deref(), Some("cam-1"));

        ctx.dispose();
    }
}
