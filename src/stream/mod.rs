use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

mod synthetic;

pub use synthetic::SyntheticVideoDevice;

/// Raw frame as produced by a device. Pixels are tightly packed RGB8.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A single media track within a stream. Stopping a track is permanent;
/// a released device must be re-opened to produce frames again.
#[derive(Debug)]
pub struct Track {
    active: AtomicBool,
}

impl Track {
    fn video() -> Self {
        Self {
            active: AtomicBool::new(true),
        }
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Source of frames behind an open stream.
#[async_trait]
pub trait FrameProducer: Send + Sync {
    /// Produce the next frame, or `None` once the source is exhausted.
    async fn next_frame(&self) -> Option<FrameData>;
}

/// The boundary at which capture hardware is abstracted. Opening a device
/// may be denied, which surfaces as a `DeviceAccessError`.
#[async_trait]
pub trait VideoDevice: Send + Sync {
    async fn open(&self, device: &str) -> Result<StreamSource>;
}

/// Live capture handle. Shared between cameras that monitor the same
/// device; frames stop flowing once all tracks are stopped.
pub struct StreamSource {
    device: String,
    tracks: Vec<Track>,
    producer: Box<dyn FrameProducer>,
}

impl StreamSource {
    pub fn new(device: impl Into<String>, producer: Box<dyn FrameProducer>) -> Self {
        Self {
            device: device.into(),
            tracks: vec![Track::video()],
            producer,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(Track::is_active)
    }

    /// Yield the next frame, or `None` if the tracks have been stopped.
    pub async fn next_frame(&self) -> Option<FrameData> {
        if !self.is_live() {
            return None;
        }
        self.producer.next_frame().await
    }

    /// Stop every underlying track.
    pub fn stop_tracks(&self) {
        for track in &self.tracks {
            track.stop();
        }
        debug!(device = %self.device, "stream tracks stopped");
    }
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource")
            .field("device", &self.device)
            .field("live", &self.is_live())
            .finish()
    }
}

struct OpenEntry {
    stream: Arc<StreamSource>,
    refs: usize,
}

/// Reference-counted device acquisition. Cameras sharing a device reuse
/// the same open handle; the device is physically released only when the
/// last reference is dropped.
pub struct DeviceRegistry {
    device: Arc<dyn VideoDevice>,
    open: Mutex<HashMap<String, OpenEntry>>,
}

impl DeviceRegistry {
    pub fn new(device: Arc<dyn VideoDevice>) -> Self {
        Self {
            device,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a stream handle for `device`, reusing an already-open one
    /// when available.
    pub async fn acquire(&self, device: &str) -> Result<Arc<StreamSource>> {
        {
            let mut open = self.open.lock();
            if let Some(entry) = open.get_mut(device) {
                entry.refs += 1;
                debug!(device, refs = entry.refs, "reusing open capture device");
                return Ok(Arc::clone(&entry.stream));
            }
        }

        let stream = Arc::new(self.device.open(device).await?);

        let mut open = self.open.lock();
        // A concurrent acquire may have opened the device while we were
        // waiting; keep the existing handle and discard ours.
        if let Some(entry) = open.get_mut(device) {
            entry.refs += 1;
            stream.stop_tracks();
            return Ok(Arc::clone(&entry.stream));
        }

        info!(device, "capture device opened");
        open.insert(
            device.to_string(),
            OpenEntry {
                stream: Arc::clone(&stream),
                refs: 1,
            },
        );
        Ok(stream)
    }

    /// Drop one reference to `device`. Tracks are stopped and the handle
    /// discarded when the count reaches zero.
    pub fn release(&self, device: &str) {
        let mut open = self.open.lock();
        match open.get_mut(device) {
            Some(entry) => {
                entry.refs -= 1;
                if entry.refs == 0 {
                    let entry = open.remove(device).unwrap();
                    entry.stream.stop_tracks();
                    info!(device, "capture device released");
                } else {
                    debug!(device, refs = entry.refs, "capture device still shared");
                }
            }
            None => warn!(device, "release of a device that is not open"),
        }
    }

    /// Current reference count for `device`.
    pub fn ref_count(&self, device: &str) -> usize {
        self.open.lock().get(device).map(|e| e.refs).unwrap_or(0)
    }
}
