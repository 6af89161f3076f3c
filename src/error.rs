use thiserror::Error;

/// Capture device acquisition failures.
#[derive(Error, Debug)]
pub enum DeviceAccessError {
    #[error("Access to capture device '{device}' was denied")]
    Denied { device: String },

    #[error("Capture device '{device}' not found")]
    NotFound { device: String },
}

/// Frame grab and encoding failures.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No frame from camera '{camera_id}' within {waited_ms}ms")]
    Timeout { camera_id: String, waited_ms: u64 },

    #[error("Stream for camera '{camera_id}' ended before a frame was produced")]
    Ended { camera_id: String },

    #[error("A capture is already in flight for camera '{camera_id}'")]
    Busy { camera_id: String },

    #[error("Frame encoding failed: {details}")]
    Encode { details: String },
}

/// Failures talking to the remote detection endpoint.
#[derive(Error, Debug)]
pub enum DetectionBackendError {
    #[error("Detection request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Detection endpoint returned status {status}")]
    Status { status: u16 },
}

/// Failures fetching the remote alert log.
#[derive(Error, Debug)]
pub enum AlertFetchError {
    #[error("Alert fetch failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Alert endpoint returned status {status}")]
    Status { status: u16 },
}

#[derive(Error, Debug)]
pub enum SentrycamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown camera '{camera_id}'")]
    CameraNotFound { camera_id: String },

    #[error("No active stream for camera '{camera_id}'")]
    NoActiveStream { camera_id: String },

    #[error("Device access error: {0}")]
    DeviceAccess(#[from] DeviceAccessError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Detection backend error: {0}")]
    DetectionBackend(#[from] DetectionBackendError),

    #[error("Alert fetch error: {0}")]
    AlertFetch(#[from] AlertFetchError),
}

pub type Result<T> = std::result::Result<T, SentrycamError>;
