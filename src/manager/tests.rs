use super::*;
use crate::config::{CaptureConfig, LifecycleConfig};
use crate::stream::{FrameData, FrameProducer, StreamSource, SyntheticVideoDevice, VideoDevice};
use crate::types::BoundingBox;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// Detector that replays a fixed script of results, then reports nothing.
struct ScriptedDetector {
    results: Mutex<VecDeque<DetectionResult>>,
}

impl ScriptedDetector {
    fn new(results: Vec<DetectionResult>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
        })
    }

    fn knife() -> DetectionResult {
        DetectionResult {
            detected: true,
            alert_id: None,
            object_type: Some("knife".to_string()),
            confidence: Some(0.9),
            timestamp: None,
            message: None,
            bounding_box: Some(BoundingBox {
                x: 0.1,
                y: 0.2,
                width: 0.3,
                height: 0.1,
            }),
            all_detections: None,
        }
    }

    fn nothing() -> DetectionResult {
        DetectionResult {
            detected: false,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, _camera_id: &str, _image: &str) -> crate::error::Result<DetectionResult> {
        Ok(self
            .results
            .lock()
            .pop_front()
            .unwrap_or_else(Self::nothing))
    }

    async fn fetch_alert_history(&self) -> crate::error::Result<Vec<Alert>> {
        Ok(Vec::new())
    }
}

fn test_manager(
    detector: Arc<dyn Detector>,
    capture_interval: u64,
) -> (Arc<CameraManager>, Arc<AlertStore>) {
    let alerts = Arc::new(AlertStore::new(100));
    let devices = Arc::new(DeviceRegistry::new(Arc::new(SyntheticVideoDevice::new((
        32, 24,
    )))));
    let cameras = vec![
        Camera::new("cam-1", "Front Entrance", "video0"),
        Camera::new("cam-2", "Back Door", "video0"),
        Camera::new("cam-3", "Parking Lot", "video1"),
    ];
    let manager = CameraManager::new(
        cameras,
        devices,
        detector,
        Arc::clone(&alerts),
        CaptureConfig {
            interval_seconds: capture_interval,
            frame_wait_ms: 1000,
            jpeg_quality: 80,
        },
        LifecycleConfig {
            alert_dwell_seconds: 5,
        },
    );
    (manager, alerts)
}

fn assert_invariant(manager: &CameraManager) {
    for camera in manager.cameras() {
        assert!(
            camera.stream_consistent(),
            "stream invariant violated for {} in {:?}",
            camera.id,
            camera.status
        );
    }
}

#[tokio::test]
async fn start_activates_camera_with_stream() {
    let (manager, _) = test_manager(ScriptedDetector::new(vec![]), 10);

    manager.start("cam-1").await.unwrap();

    let camera = manager.camera("cam-1").unwrap();
    assert_eq!(camera.status, CameraStatus::Active);
    assert!(camera.stream.is_some());
    assert_invariant(&manager);
}

#[tokio::test]
async fn start_unknown_camera_fails() {
    let (manager, _) = test_manager(ScriptedDetector::new(vec![]), 10);

    let err = manager.start("cam-99").await.unwrap_err();
    assert!(matches!(err, SentrycamError::CameraNotFound { .. }));
}

#[tokio::test]
async fn start_is_idempotent() {
    let (manager, _) = test_manager(ScriptedDetector::new(vec![]), 10);

    manager.start("cam-1").await.unwrap();
    let first = manager.camera("cam-1").unwrap();

    manager.start("cam-1").await.unwrap();
    let second = manager.camera("cam-1").unwrap();

    assert_eq!(second.status, CameraStatus::Active);
    // the stream reference is unchanged
    assert!(Arc::ptr_eq(
        first.stream.as_ref().unwrap(),
        second.stream.as_ref().unwrap()
    ));
}

#[tokio::test]
async fn stop_inactive_camera_is_noop() {
    let (manager, _) = test_manager(ScriptedDetector::new(vec![]), 10);

    let before = manager.camera("cam-1").unwrap();
    manager.stop("cam-1").unwrap();
    let after = manager.camera("cam-1").unwrap();

    assert_eq!(after.status, CameraStatus::Inactive);
    assert_eq!(before.last_updated, after.last_updated);
}

#[tokio::test]
async fn shared_device_released_at_zero_references() {
    let (manager, _) = test_manager(ScriptedDetector::new(vec![]), 10);

    // cam-1 and cam-2 share video0
    manager.start("cam-1").await.unwrap();
    manager.start("cam-2").await.unwrap();

    let stream = manager.camera("cam-1").unwrap().stream.unwrap();
    assert!(Arc::ptr_eq(
        &stream,
        manager.camera("cam-2").unwrap().stream.as_ref().unwrap()
    ));

    manager.stop("cam-1").unwrap();
    // cam-2 still holds a reference, the device stays open
    assert!(stream.is_live());
    assert_invariant(&manager);

    manager.stop("cam-2").unwrap();
    assert!(!stream.is_live());
    assert_invariant(&manager);
}

#[tokio::test]
async fn capture_without_stream_fails() {
    let (manager, _) = test_manager(ScriptedDetector::new(vec![]), 10);

    let err = manager.capture_image("cam-1").await.unwrap_err();
    assert!(matches!(err, SentrycamError::NoActiveStream { .. }));
}

#[tokio::test]
async fn denied_device_leaves_camera_inactive() {
    let devices = Arc::new(DeviceRegistry::new(Arc::new(
        SyntheticVideoDevice::new((32, 24)).with_denied("video0"),
    )));
    let manager = CameraManager::new(
        vec![Camera::new("cam-1", "Front Entrance", "video0")],
        devices,
        ScriptedDetector::new(vec![]),
        Arc::new(AlertStore::new(100)),
        CaptureConfig {
            interval_seconds: 10,
            frame_wait_ms: 1000,
            jpeg_quality: 80,
        },
        LifecycleConfig {
            alert_dwell_seconds: 5,
        },
    );

    let err = manager.start("cam-1").await.unwrap_err();
    assert!(matches!(err, SentrycamError::DeviceAccess(_)));

    let camera = manager.camera("cam-1").unwrap();
    assert_eq!(camera.status, CameraStatus::Inactive);
    assert!(camera.stream.is_none());
    // the failed start must not have scheduled a capture timer
    assert!(manager.capture_tasks.lock().is_empty());
    assert_invariant(&manager);
}

/// Device whose producer holds each frame until the gate is released.
struct GatedDevice {
    gate: Arc<Notify>,
}

#[async_trait]
impl VideoDevice for GatedDevice {
    async fn open(&self, device: &str) -> crate::error::Result<StreamSource> {
        struct GatedProducer {
            gate: Arc<Notify>,
        }
        #[async_trait]
        impl FrameProducer for GatedProducer {
            async fn next_frame(&self) -> Option<FrameData> {
                self.gate.notified().await;
                Some(FrameData {
                    width: 2,
                    height: 2,
                    pixels: vec![0u8; 12],
                })
            }
        }
        Ok(StreamSource::new(
            device,
            Box::new(GatedProducer {
                gate: Arc::clone(&self.gate),
            }),
        ))
    }
}

#[tokio::test]
async fn stop_during_capture_discards_the_frame() {
    let gate = Arc::new(Notify::new());
    let alerts = Arc::new(AlertStore::new(100));
    let devices = Arc::new(DeviceRegistry::new(Arc::new(GatedDevice {
        gate: Arc::clone(&gate),
    })));
    let manager = CameraManager::new(
        vec![Camera::new("cam-1", "Front Entrance", "video0")],
        devices,
        ScriptedDetector::new(vec![ScriptedDetector::knife()]),
        Arc::clone(&alerts),
        CaptureConfig {
            interval_seconds: 60,
            frame_wait_ms: 10_000,
            jpeg_quality: 80,
        },
        LifecycleConfig {
            alert_dwell_seconds: 5,
        },
    );

    manager.start("cam-1").await.unwrap();

    let capture = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.capture_image("cam-1").await })
    };
    tokio::task::yield_now().await;

    // camera goes down while the frame is still in flight
    manager.stop("cam-1").unwrap();
    gate.notify_one();

    capture.await.unwrap().unwrap();
    let camera = manager.camera("cam-1").unwrap();
    assert_eq!(camera.status, CameraStatus::Inactive);
    assert!(camera.last_image.is_none());
    assert!(camera.detected_objects.is_empty());
    assert!(alerts.is_empty());
    assert_invariant(&manager);
}

/// Detector that holds its verdict until the gate is released.
struct GatedDetector {
    gate: Arc<Notify>,
}

#[async_trait]
impl Detector for GatedDetector {
    async fn detect(
        &self,
        _camera_id: &str,
        _image: &str,
    ) -> crate::error::Result<DetectionResult> {
        self.gate.notified().await;
        Ok(ScriptedDetector::knife())
    }

    async fn fetch_alert_history(&self) -> crate::error::Result<Vec<Alert>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn stop_during_detection_discards_the_result() {
    let gate = Arc::new(Notify::new());
    let alerts = Arc::new(AlertStore::new(100));
    let devices = Arc::new(DeviceRegistry::new(Arc::new(SyntheticVideoDevice::new(
        (32, 24),
    ))));
    let manager = CameraManager::new(
        vec![Camera::new("cam-1", "Front Entrance", "video0")],
        devices,
        Arc::new(GatedDetector {
            gate: Arc::clone(&gate),
        }),
        Arc::clone(&alerts),
        CaptureConfig {
            interval_seconds: 60,
            frame_wait_ms: 1000,
            jpeg_quality: 80,
        },
        LifecycleConfig {
            alert_dwell_seconds: 5,
        },
    );

    manager.start("cam-1").await.unwrap();

    let capture = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.capture_image("cam-1").await })
    };
    tokio::task::yield_now().await;

    // the frame was grabbed while active; the verdict lands after stop
    manager.stop("cam-1").unwrap();
    gate.notify_one();

    capture.await.unwrap().unwrap();
    let camera = manager.camera("cam-1").unwrap();
    assert_eq!(camera.status, CameraStatus::Inactive);
    assert!(camera.detected_objects.is_empty());
    assert!(alerts.is_empty());
    assert_invariant(&manager);
}

#[tokio::test(start_paused = true)]
async fn detection_raises_alert_and_reverts_after_dwell() {
    let (manager, alerts) = test_manager(ScriptedDetector::new(vec![ScriptedDetector::knife()]), 60);

    manager.start("cam-1").await.unwrap();
    let image = manager.capture_image("cam-1").await.unwrap();
    assert!(image.starts_with("data:image/jpeg;base64,"));

    let camera = manager.camera("cam-1").unwrap();
    assert_eq!(camera.status, CameraStatus::Alert);
    assert_eq!(camera.last_image, Some(image));
    assert_eq!(camera.detected_objects.len(), 1);
    assert_eq!(camera.detected_objects[0].object_type, "knife");
    assert_invariant(&manager);

    let log = alerts.alerts();
    assert_eq!(log[0].camera_id, "cam-1");
    assert_eq!(log[0].object_type, "knife");
    assert_eq!(alerts.total_detections(), 1);

    // one dwell period later the camera is active again, exactly once
    tokio::time::sleep(Duration::from_secs(6)).await;
    let camera = manager.camera("cam-1").unwrap();
    assert_eq!(camera.status, CameraStatus::Active);
    assert!(camera.detected_objects.is_empty());
    assert_invariant(&manager);
}

#[tokio::test(start_paused = true)]
async fn negative_detection_keeps_camera_active() {
    let (manager, alerts) = test_manager(ScriptedDetector::new(vec![ScriptedDetector::nothing()]), 60);

    manager.start("cam-1").await.unwrap();
    manager.capture_image("cam-1").await.unwrap();

    let camera = manager.camera("cam-1").unwrap();
    assert_eq!(camera.status, CameraStatus::Active);
    assert!(camera.last_image.is_some());
    assert!(alerts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn repeat_detection_resets_dwell_instead_of_stacking() {
    let (manager, _) = test_manager(
        ScriptedDetector::new(vec![ScriptedDetector::knife(), ScriptedDetector::knife()]),
        60,
    );

    manager.start("cam-1").await.unwrap();
    manager.capture_image("cam-1").await.unwrap();
    assert_eq!(manager.camera("cam-1").unwrap().status, CameraStatus::Alert);

    // second detection 3s into the 5s dwell
    tokio::time::sleep(Duration::from_secs(3)).await;
    manager.capture_image("cam-1").await.unwrap();

    // 5.5s after the first detection the original timer must not have fired
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(manager.camera("cam-1").unwrap().status, CameraStatus::Alert);

    // 5s after the second detection the camera reverts
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(manager.camera("cam-1").unwrap().status, CameraStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn reversion_never_resurrects_a_stopped_camera() {
    let (manager, _) = test_manager(ScriptedDetector::new(vec![ScriptedDetector::knife()]), 60);

    manager.start("cam-1").await.unwrap();
    manager.capture_image("cam-1").await.unwrap();
    assert_eq!(manager.camera("cam-1").unwrap().status, CameraStatus::Alert);

    manager.stop("cam-1").unwrap();
    assert_eq!(manager.camera("cam-1").unwrap().status, CameraStatus::Inactive);

    // let the (cancelled) dwell timer elapse
    tokio::time::sleep(Duration::from_secs(6)).await;
    let camera = manager.camera("cam-1").unwrap();
    assert_eq!(camera.status, CameraStatus::Inactive);
    assert!(camera.stream.is_none());
    assert_invariant(&manager);
}

#[tokio::test(start_paused = true)]
async fn capture_timer_drives_periodic_detection() {
    let (manager, alerts) = test_manager(ScriptedDetector::new(vec![ScriptedDetector::knife()]), 2);

    manager.start("cam-1").await.unwrap();
    assert!(manager.camera("cam-1").unwrap().last_image.is_none());

    // first scheduled capture lands one period after start
    tokio::time::sleep(Duration::from_millis(2100)).await;
    let camera = manager.camera("cam-1").unwrap();
    assert!(camera.last_image.is_some());
    assert_eq!(camera.status, CameraStatus::Alert);
    assert_eq!(alerts.total_detections(), 1);

    manager.stop("cam-1").unwrap();
    // no further captures after stop
    let last = manager.camera("cam-1").unwrap().last_updated;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(manager.camera("cam-1").unwrap().last_updated, last);
}

struct StalledDevice;

#[async_trait]
impl VideoDevice for StalledDevice {
    async fn open(&self, device: &str) -> crate::error::Result<StreamSource> {
        struct Pending;
        #[async_trait]
        impl FrameProducer for Pending {
            async fn next_frame(&self) -> Option<FrameData> {
                std::future::pending().await
            }
        }
        Ok(StreamSource::new(device, Box::new(Pending)))
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_capture_is_rejected_not_interleaved() {
    let alerts = Arc::new(AlertStore::new(100));
    let devices = Arc::new(DeviceRegistry::new(Arc::new(StalledDevice)));
    let manager = CameraManager::new(
        vec![Camera::new("cam-1", "Front Entrance", "video0")],
        devices,
        ScriptedDetector::new(vec![]),
        alerts,
        CaptureConfig {
            interval_seconds: 60,
            frame_wait_ms: 10_000,
            jpeg_quality: 80,
        },
        LifecycleConfig {
            alert_dwell_seconds: 5,
        },
    );

    manager.start("cam-1").await.unwrap();

    let first = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.capture_image("cam-1").await })
    };
    tokio::task::yield_now().await;

    // second request while the first is waiting on a frame
    let err = manager.capture_image("cam-1").await.unwrap_err();
    assert!(matches!(
        err,
        SentrycamError::Capture(CaptureError::Busy { .. })
    ));

    // the stalled capture eventually times out without disturbing status
    let result = first.await.unwrap();
    assert!(matches!(
        result,
        Err(SentrycamError::Capture(CaptureError::Timeout { .. }))
    ));
    assert_eq!(manager.camera("cam-1").unwrap().status, CameraStatus::Active);
}

#[tokio::test]
async fn dispose_stops_everything() {
    let (manager, _) = test_manager(ScriptedDetector::new(vec![]), 10);

    manager.start("cam-1").await.unwrap();
    manager.start("cam-3").await.unwrap();
    let stream_a = manager.camera("cam-1").unwrap().stream.unwrap();
    let stream_b = manager.camera("cam-3").unwrap().stream.unwrap();

    manager.dispose();

    for camera in manager.cameras() {
        assert_eq!(camera.status, CameraStatus::Inactive);
        assert!(camera.stream.is_none());
    }
    assert!(!stream_a.is_live());
    assert!(!stream_b.is_live());
}
