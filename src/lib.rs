pub mod alerts;
pub mod capture;
pub mod config;
pub mod context;
pub mod detector;
pub mod error;
pub mod manager;
pub mod session;
pub mod stream;
pub mod types;

pub use alerts::AlertStore;
pub use config::{DetectionMode, SentrycamConfig};
pub use context::{AnalyticsSummary, SentrycamContext};
pub use detector::{Detector, FailoverDetector, HttpDetector, SimulatedDetector};
pub use error::{Result, SentrycamError};
pub use manager::CameraManager;
pub use session::{Role, Session};
pub use stream::{DeviceRegistry, FrameData, StreamSource, SyntheticVideoDevice, VideoDevice};
pub use types::{
    Alert, BoundingBox, Camera, CameraStatus, DetectedObject, DetectionResult,
};
