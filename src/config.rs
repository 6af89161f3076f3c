use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SentrycamConfig {
    pub cameras: Vec<CameraDef>,
    pub capture: CaptureConfig,
    pub detection: DetectionConfig,
    pub alerts: AlertConfig,
    pub lifecycle: LifecycleConfig,
}

/// Static definition of a monitored camera.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraDef {
    pub id: String,
    pub name: String,

    /// Capture device identifier. Cameras sharing a device share the
    /// underlying stream handle.
    #[serde(default = "default_camera_device")]
    pub device: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    /// Seconds between scheduled captures per active camera
    pub interval_seconds: u64,

    /// Bounded wait for a frame before the capture attempt is abandoned
    pub frame_wait_ms: u64,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DetectionConfig {
    /// Detector selection: remote only, simulated only, or remote with
    /// simulated failover
    pub mode: DetectionMode,

    /// Base URL of the detection backend
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Probability that the simulated detector reports a detection
    pub detection_probability: f64,

    /// RNG seed for the simulated detector; unset draws from entropy
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Remote endpoint only; backend failures propagate to the caller
    Remote,
    /// Simulated detector only, no network traffic
    Simulated,
    /// Remote endpoint with fallback to the simulated detector
    Auto,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AlertConfig {
    /// Seconds between alert-history polls
    pub poll_interval_seconds: u64,

    /// Rolling alert log capacity; oldest entries are evicted first
    pub max_entries: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Seconds a camera dwells in alert before auto-reverting to active
    pub alert_dwell_seconds: u64,
}

impl SentrycamConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with SENTRYCAM_ prefix
            .add_source(Environment::with_prefix("SENTRYCAM").separator("__"))
            .build()?;

        let config: SentrycamConfig = settings.try_deserialize()?;
        config.validate()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::Message(
                "At least one camera must be configured".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(&camera.id) {
                return Err(ConfigError::Message(format!(
                    "Duplicate camera id '{}'",
                    camera.id
                )));
            }
        }

        if self.capture.interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Capture interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Capture jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.detection_probability) {
            return Err(ConfigError::Message(
                "Detection detection_probability must be within [0, 1]".to_string(),
            ));
        }

        if self.alerts.poll_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Alert poll_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.alerts.max_entries == 0 {
            return Err(ConfigError::Message(
                "Alert max_entries must be greater than 0".to_string(),
            ));
        }

        if self.lifecycle.alert_dwell_seconds == 0 {
            return Err(ConfigError::Message(
                "Lifecycle alert_dwell_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SentrycamConfig {
    fn default() -> Self {
        Self {
            cameras: default_cameras(),
            capture: CaptureConfig::default(),
            detection: DetectionConfig::default(),
            alerts: AlertConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_capture_interval(),
            frame_wait_ms: default_frame_wait_ms(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mode: default_detection_mode(),
            base_url: default_detection_base_url(),
            timeout_seconds: default_detection_timeout(),
            detection_probability: default_detection_probability(),
            seed: None,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            alert_dwell_seconds: default_alert_dwell(),
        }
    }
}

// Default value functions
fn default_cameras() -> Vec<CameraDef> {
    [
        ("cam-1", "Front Entrance"),
        ("cam-2", "Back Door"),
        ("cam-3", "Parking Lot"),
        ("cam-4", "Reception"),
    ]
    .iter()
    .map(|(id, name)| CameraDef {
        id: id.to_string(),
        name: name.to_string(),
        device: default_camera_device(),
    })
    .collect()
}

fn default_camera_device() -> String {
    "video0".to_string()
}

fn default_capture_interval() -> u64 {
    10
}
fn default_frame_wait_ms() -> u64 {
    1000
}
fn default_jpeg_quality() -> u8 {
    80
}

fn default_detection_mode() -> DetectionMode {
    DetectionMode::Auto
}
fn default_detection_base_url() -> String {
    "http://localhost:5000".to_string()
}
fn default_detection_timeout() -> u64 {
    10
}
fn default_detection_probability() -> f64 {
    0.9
}

fn default_poll_interval() -> u64 {
    30
}
fn default_max_entries() -> usize {
    100
}

fn default_alert_dwell() -> u64 {
    5
}
