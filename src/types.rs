use crate::stream::StreamSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-camera state machine states. Mutually exclusive, single source of
/// truth per camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Inactive,
    Active,
    Alert,
}

/// Normalized rectangle locating a detected object within a frame.
/// All fields are fractions of the frame dimensions, origin top-left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// An object found in the most recent positive detection. Ephemeral:
/// attached to a camera only for the duration of an active alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    #[serde(rename = "type")]
    pub object_type: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

/// A monitored camera. The lifecycle manager is the sole writer of the
/// `stream`, `status` and `last_image` fields.
#[derive(Debug, Clone, Serialize)]
pub struct Camera {
    pub id: String,
    pub name: String,
    /// Capture device identifier; cameras may share a device.
    pub device: String,
    pub status: CameraStatus,
    /// Live capture handle, present iff `status != Inactive`.
    #[serde(skip_serializing)]
    pub stream: Option<Arc<StreamSource>>,
    /// Most recent captured still as a base64 JPEG data URL.
    pub last_image: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub detected_objects: Vec<DetectedObject>,
}

impl Camera {
    pub fn new<S: Into<String>>(id: S, name: S, device: S) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device: device.into(),
            status: CameraStatus::Inactive,
            stream: None,
            last_image: None,
            last_updated: Utc::now(),
            detected_objects: Vec::new(),
        }
    }

    /// Invariant check: `stream` is non-null iff `status != Inactive`.
    pub fn stream_consistent(&self) -> bool {
        (self.status == CameraStatus::Inactive) == self.stream.is_none()
    }
}

/// A materialized alert. `camera_id` is a weak reference; an alert
/// outlives the camera it was raised on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub camera_id: String,
    pub object_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// Wire format of the `POST /detect` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detected: bool,
    #[serde(default)]
    pub alert_id: Option<String>,
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub all_detections: Option<Vec<DetectedObject>>,
}

/// Classification labels that trigger an alert when detected.
pub const SUSPICIOUS_OBJECT_TYPES: &[&str] = &[
    "knife",
    "cell phone",
    "scissors",
    "baseball bat",
    "tie",
    "handbag",
];

pub fn is_suspicious(object_type: &str) -> bool {
    SUSPICIOUS_OBJECT_TYPES.contains(&object_type)
}

/// Operator-facing name for a detector classification label. The detector
/// vocabulary uses COCO class names; some of them stand in for objects the
/// dataset has no class for.
pub fn display_name(object_type: &str) -> &str {
    match object_type {
        "cell phone" => "Smartphone",
        "knife" => "Knife",
        "scissors" => "Scissors",
        "baseball bat" => "Bat",
        "tie" => "Rope",
        "handbag" => "Gun",
        other => other,
    }
}
