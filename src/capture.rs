use crate::error::{CaptureError, Result};
use crate::stream::{FrameData, StreamSource};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use std::time::Duration;
use tracing::trace;

/// Grab a single still from a live stream: wait (bounded) for the next
/// frame, encode it as JPEG at the stream's native resolution and return
/// it as a `data:image/jpeg;base64,…` data URL.
pub async fn capture_still(
    camera_id: &str,
    stream: &StreamSource,
    wait: Duration,
    quality: u8,
) -> Result<String> {
    let frame = tokio::time::timeout(wait, stream.next_frame())
        .await
        .map_err(|_| CaptureError::Timeout {
            camera_id: camera_id.to_string(),
            waited_ms: wait.as_millis() as u64,
        })?
        .ok_or_else(|| CaptureError::Ended {
            camera_id: camera_id.to_string(),
        })?;

    trace!(
        camera_id,
        width = frame.width,
        height = frame.height,
        "frame grabbed"
    );
    encode_jpeg_data_url(&frame, quality)
}

/// Encode an RGB frame as a base64 JPEG data URL.
pub fn encode_jpeg_data_url(frame: &FrameData, quality: u8) -> Result<String> {
    let img = image::RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone())
        .ok_or_else(|| CaptureError::Encode {
            details: "frame buffer does not match its dimensions".to_string(),
        })?;

    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder
        .encode_image(&img)
        .map_err(|e| CaptureError::Encode {
            details: e.to_string(),
        })?;

    Ok(format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&jpeg)
    ))
}

/// Strip the data-URL prefix, leaving the raw base64 payload the backend
/// expects.
pub fn data_url_payload(data_url: &str) -> &str {
    data_url
        .split_once(',')
        .map(|(_, payload)| payload)
        .unwrap_or(data_url)
}
