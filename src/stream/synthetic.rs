use super::{FrameData, FrameProducer, StreamSource, VideoDevice};
use crate::error::{DeviceAccessError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// In-process capture device producing test-pattern frames. Stands in for
/// real media acquisition so the pipeline runs without hardware; tests use
/// the deny list to exercise the permission-denied path.
pub struct SyntheticVideoDevice {
    resolution: (u32, u32),
    denied: HashSet<String>,
}

impl SyntheticVideoDevice {
    pub fn new(resolution: (u32, u32)) -> Self {
        Self {
            resolution,
            denied: HashSet::new(),
        }
    }

    /// Mark a device id as permission-denied.
    pub fn with_denied(mut self, device: impl Into<String>) -> Self {
        self.denied.insert(device.into());
        self
    }
}

impl Default for SyntheticVideoDevice {
    fn default() -> Self {
        Self::new((640, 480))
    }
}

#[async_trait]
impl VideoDevice for SyntheticVideoDevice {
    async fn open(&self, device: &str) -> Result<StreamSource> {
        if self.denied.contains(device) {
            return Err(DeviceAccessError::Denied {
                device: device.to_string(),
            }
            .into());
        }

        debug!(device, "opening synthetic capture device");
        let producer = SyntheticProducer {
            width: self.resolution.0,
            height: self.resolution.1,
            frame_counter: AtomicU64::new(0),
        };
        Ok(StreamSource::new(device, Box::new(producer)))
    }
}

struct SyntheticProducer {
    width: u32,
    height: u32,
    frame_counter: AtomicU64,
}

#[async_trait]
impl FrameProducer for SyntheticProducer {
    async fn next_frame(&self) -> Option<FrameData> {
        let seq = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        let (w, h) = (self.width, self.height);
        let mut pixels = Vec::with_capacity((w * h * 3) as usize);
        // Scrolling gradient so consecutive frames differ.
        let phase = (seq % 256) as u32;
        for y in 0..h {
            for x in 0..w {
                pixels.push(((x + phase) % 256) as u8);
                pixels.push(((y + phase) % 256) as u8);
                pixels.push((phase % 256) as u8);
            }
        }
        Some(FrameData {
            width: w,
            height: h,
            pixels,
        })
    }
}
