use crate::alerts::AlertStore;
use crate::capture;
use crate::config::{CaptureConfig, LifecycleConfig};
use crate::detector::Detector;
use crate::error::{CaptureError, Result, SentrycamError};
use crate::stream::DeviceRegistry;
use crate::types::{Alert, Camera, CameraStatus, DetectedObject, DetectionResult};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[cfg(test)]
mod tests;

struct CaptureTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct ReversionTask {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Owns the camera set, their status transitions, stream acquisition and
/// release, the per-camera capture timers and the timed alert reversion.
/// Sole writer of camera entities.
pub struct CameraManager {
    cameras: Mutex<Vec<Camera>>,
    devices: Arc<DeviceRegistry>,
    detector: Arc<dyn Detector>,
    alerts: Arc<AlertStore>,
    capture_config: CaptureConfig,
    lifecycle_config: LifecycleConfig,
    capture_tasks: Mutex<HashMap<String, CaptureTask>>,
    reversion_tasks: Mutex<HashMap<String, ReversionTask>>,
    reversion_generation: AtomicU64,
    in_flight: Mutex<HashSet<String>>,
    cancel: CancellationToken,
    /// Handle to ourselves for the spawned timer tasks; upgrading fails
    /// once the manager is dropped, which ends the task.
    weak_self: Weak<Self>,
}

impl CameraManager {
    pub fn new(
        cameras: Vec<Camera>,
        devices: Arc<DeviceRegistry>,
        detector: Arc<dyn Detector>,
        alerts: Arc<AlertStore>,
        capture_config: CaptureConfig,
        lifecycle_config: LifecycleConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            cameras: Mutex::new(cameras),
            devices,
            detector,
            alerts,
            capture_config,
            lifecycle_config,
            capture_tasks: Mutex::new(HashMap::new()),
            reversion_tasks: Mutex::new(HashMap::new()),
            reversion_generation: AtomicU64::new(0),
            in_flight: Mutex::new(HashSet::new()),
            cancel: CancellationToken::new(),
            weak_self: weak.clone(),
        })
    }

    /// Snapshot of all cameras.
    pub fn cameras(&self) -> Vec<Camera> {
        self.cameras.lock().clone()
    }

    /// Snapshot of a single camera.
    pub fn camera(&self, camera_id: &str) -> Option<Camera> {
        self.cameras.lock().iter().find(|c| c.id == camera_id).cloned()
    }

    /// Start a camera: acquire its stream, mark it active and schedule the
    /// recurring capture timer. Starting an already-running camera is a
    /// no-op; a device-access denial leaves it inactive.
    pub async fn start(&self, camera_id: &str) -> Result<()> {
        let device = {
            let cameras = self.cameras.lock();
            let camera = find(&cameras, camera_id)?;
            if camera.status != CameraStatus::Inactive {
                debug!(camera_id, "start requested but camera is already running");
                return Ok(());
            }
            camera.device.clone()
        };

        // acquisition happens outside the camera lock; on denial the camera
        // never leaves Inactive
        let stream = self.devices.acquire(&device).await?;

        {
            let mut cameras = self.cameras.lock();
            let camera = find_mut(&mut cameras, camera_id)?;
            if camera.status == CameraStatus::Inactive {
                camera.status = CameraStatus::Active;
                camera.stream = Some(stream);
                camera.last_updated = Utc::now();
                info!(camera_id = %camera.id, name = %camera.name, "camera started");
            } else {
                // raced with another start; keep the first acquisition
                drop(cameras);
                self.devices.release(&device);
                return Ok(());
            }
        }

        self.spawn_capture_task(camera_id);
        Ok(())
    }

    /// Stop a camera: cancel its timers, release the stream reference and
    /// mark it inactive. Stopping an inactive camera is a no-op.
    pub fn stop(&self, camera_id: &str) -> Result<()> {
        // cancel timers first so no tick lands mid-teardown
        if let Some(task) = self.capture_tasks.lock().remove(camera_id) {
            task.cancel.cancel();
            task.handle.abort();
        }
        if let Some(task) = self.reversion_tasks.lock().remove(camera_id) {
            task.handle.abort();
        }

        let device = {
            let mut cameras = self.cameras.lock();
            let camera = find_mut(&mut cameras, camera_id)?;
            if camera.status == CameraStatus::Inactive {
                debug!(camera_id, "stop requested but camera is already inactive");
                return Ok(());
            }
            camera.status = CameraStatus::Inactive;
            camera.stream = None;
            camera.detected_objects.clear();
            camera.last_updated = Utc::now();
            info!(camera_id = %camera.id, "camera stopped");
            camera.device.clone()
        };

        self.devices.release(&device);
        Ok(())
    }

    /// Capture a still from the camera's stream, run it through the
    /// detector and apply any positive result. Also invoked manually,
    /// independent of the timer. At most one capture is in flight per
    /// camera; overlapping requests fail with `CaptureError::Busy`.
    pub async fn capture_image(&self, camera_id: &str) -> Result<String> {
        let stream = {
            let cameras = self.cameras.lock();
            let camera = find(&cameras, camera_id)?;
            camera
                .stream
                .clone()
                .ok_or_else(|| SentrycamError::NoActiveStream {
                    camera_id: camera_id.to_string(),
                })?
        };

        let _guard = CaptureGuard::acquire(self, camera_id)?;

        let image = capture::capture_still(
            camera_id,
            &stream,
            Duration::from_millis(self.capture_config.frame_wait_ms),
            self.capture_config.jpeg_quality,
        )
        .await?;

        {
            let mut cameras = self.cameras.lock();
            let Ok(camera) = find_mut(&mut cameras, camera_id) else {
                return Ok(image);
            };
            if camera.status == CameraStatus::Inactive {
                // stopped while the frame was in flight
                debug!(camera_id, "camera stopped during capture, discarding frame");
                return Ok(image);
            }
            camera.last_image = Some(image.clone());
            camera.last_updated = Utc::now();
        }

        match self.detector.detect(camera_id, &image).await {
            Ok(result) if result.detected => self.apply_detection(camera_id, result),
            Ok(_) => debug!(camera_id, "no objects detected"),
            Err(e) => warn!(
                camera_id,
                "detection failed, camera keeps its current status: {}", e
            ),
        }

        Ok(image)
    }

    /// Tear down every camera and timer. Used on system shutdown.
    pub fn dispose(&self) {
        self.cancel.cancel();
        for (_, task) in self.capture_tasks.lock().drain() {
            task.cancel.cancel();
            task.handle.abort();
        }
        for (_, task) in self.reversion_tasks.lock().drain() {
            task.handle.abort();
        }

        let mut cameras = self.cameras.lock();
        for camera in cameras.iter_mut() {
            if camera.status != CameraStatus::Inactive {
                camera.status = CameraStatus::Inactive;
                camera.stream = None;
                camera.detected_objects.clear();
                camera.last_updated = Utc::now();
                self.devices.release(&camera.device);
            }
        }
        info!("camera manager disposed");
    }

    fn spawn_capture_task(&self, camera_id: &str) {
        let mut tasks = self.capture_tasks.lock();
        // at most one capture timer per camera
        if let Some(old) = tasks.remove(camera_id) {
            old.cancel.cancel();
            old.handle.abort();
        }

        let cancel = self.cancel.child_token();
        let task_cancel = cancel.clone();
        let manager = self.weak_self.clone();
        let id = camera_id.to_string();
        let period = Duration::from_secs(self.capture_config.interval_seconds);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately; skip it so captures
            // start one full period after the camera comes up
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!(camera_id = %id, "capture loop cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        match manager.capture_image(&id).await {
                            Ok(_) => {}
                            Err(SentrycamError::Capture(CaptureError::Busy { .. })) => {
                                debug!(camera_id = %id, "previous capture still in flight, skipping tick");
                            }
                            Err(SentrycamError::NoActiveStream { .. }) => {
                                // camera was stopped out from under the timer
                                break;
                            }
                            Err(e) => warn!(camera_id = %id, "scheduled capture failed: {}", e),
                        }
                    }
                }
            }
        });

        tasks.insert(camera_id.to_string(), CaptureTask { cancel, handle });
    }

    fn apply_detection(&self, camera_id: &str, result: DetectionResult) {
        let detected_objects = match &result.all_detections {
            Some(objects) if !objects.is_empty() => objects.clone(),
            _ => match (&result.object_type, &result.bounding_box) {
                (Some(object_type), Some(bounding_box)) => vec![DetectedObject {
                    object_type: object_type.clone(),
                    confidence: result.confidence.unwrap_or(0.0),
                    bounding_box: bounding_box.clone(),
                }],
                _ => Vec::new(),
            },
        };

        let camera_name = {
            let mut cameras = self.cameras.lock();
            let Ok(camera) = find_mut(&mut cameras, camera_id) else {
                return;
            };
            if camera.status == CameraStatus::Inactive {
                // late result for a torn-down camera
                debug!(camera_id, "discarding detection result for stopped camera");
                return;
            }
            camera.detected_objects = detected_objects;
            camera.status = CameraStatus::Alert;
            camera.last_updated = Utc::now();
            camera.name.clone()
        };

        let object_type = result
            .object_type
            .unwrap_or_else(|| "Unknown".to_string());
        info!(camera_id, object_type = %object_type, "suspicious object detected");

        self.alerts.append(Alert {
            id: result
                .alert_id
                .unwrap_or_else(|| format!("alert-{}", Uuid::new_v4())),
            camera_id: camera_id.to_string(),
            object_type,
            timestamp: result.timestamp.unwrap_or_else(Utc::now),
            confidence: result.confidence,
            message: result
                .message
                .unwrap_or_else(|| format!("Detected suspicious object at {}", camera_name)),
            bounding_box: result.bounding_box,
        });

        self.schedule_reversion(camera_id);
    }

    /// One-shot alert-to-active rollback after the dwell time. A repeat
    /// detection mid-dwell replaces the pending timer (reset, not stack).
    fn schedule_reversion(&self, camera_id: &str) {
        let dwell = Duration::from_secs(self.lifecycle_config.alert_dwell_seconds);
        let generation = self.reversion_generation.fetch_add(1, Ordering::Relaxed);

        let mut tasks = self.reversion_tasks.lock();
        if let Some(old) = tasks.remove(camera_id) {
            old.handle.abort();
        }

        let manager = self.weak_self.clone();
        let id = camera_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(dwell).await;
            if let Some(manager) = manager.upgrade() {
                manager.revert_alert(&id, generation);
            }
        });

        tasks.insert(
            camera_id.to_string(),
            ReversionTask { generation, handle },
        );
    }

    fn revert_alert(&self, camera_id: &str, generation: u64) {
        {
            let mut tasks = self.reversion_tasks.lock();
            match tasks.get(camera_id) {
                Some(task) if task.generation == generation => {
                    tasks.remove(camera_id);
                }
                // superseded by a newer detection or cancelled by stop
                _ => return,
            }
        }

        let mut cameras = self.cameras.lock();
        let Ok(camera) = find_mut(&mut cameras, camera_id) else {
            return;
        };
        if camera.status != CameraStatus::Alert {
            // never resurrect a stopped camera
            debug!(camera_id, status = ?camera.status, "reversion fired but camera is not in alert");
            return;
        }
        camera.status = CameraStatus::Active;
        camera.detected_objects.clear();
        camera.last_updated = Utc::now();
        debug!(camera_id, "alert dwell elapsed, camera back to active");
    }
}

fn find<'a>(cameras: &'a [Camera], camera_id: &str) -> Result<&'a Camera> {
    cameras
        .iter()
        .find(|c| c.id == camera_id)
        .ok_or_else(|| SentrycamError::CameraNotFound {
            camera_id: camera_id.to_string(),
        })
}

fn find_mut<'a>(cameras: &'a mut [Camera], camera_id: &str) -> Result<&'a mut Camera> {
    cameras
        .iter_mut()
        .find(|c| c.id == camera_id)
        .ok_or_else(|| SentrycamError::CameraNotFound {
            camera_id: camera_id.to_string(),
        })
}

/// RAII guard enforcing one capture in flight per camera.
struct CaptureGuard<'a> {
    manager: &'a CameraManager,
    camera_id: String,
}

impl<'a> CaptureGuard<'a> {
    fn acquire(manager: &'a CameraManager, camera_id: &str) -> Result<Self> {
        if !manager.in_flight.lock().insert(camera_id.to_string()) {
            return Err(CaptureError::Busy {
                camera_id: camera_id.to_string(),
            }
            .into());
        }
        Ok(Self {
            manager,
            camera_id: camera_id.to_string(),
        })
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.manager.in_flight.lock().remove(&self.camera_id);
    }
}
