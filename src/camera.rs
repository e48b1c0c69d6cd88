use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};

use crate::camera_controller::MediaStream;
use crate::encoded::EncodedImage;
use crate::error::{BoothError, BoothResult};

/// Snapshots the current frame of a live stream into an encoded still.
pub trait FrameCapturer: Send + Sync {
    fn capture(&self, stream: &MediaStream) -> BoothResult<EncodedImage>;
}

/// Lossy JPEG capturer working at the stream's native resolution.
pub struct JpegFrameCapturer {
    quality: u8,
}

impl JpegFrameCapturer {
    /// `quality` on a 0-1 scale, as configured.
    pub fn new(quality: f32) -> Self {
        Self {
            quality: (quality.clamp(0.01, 1.0) * 100.0).round() as u8,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, frame: &RgbImage) -> BoothResult<EncodedImage> {
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, self.quality);
        encoder
            .encode(frame.as_raw(), frame.width(), frame.height(), ColorType::Rgb8)
            .map_err(|e| BoothError::capture(format!("JPEG encoding failed: {}", e)))?;
        Ok(EncodedImage::new(bytes, "image/jpeg"))
    }
}

impl FrameCapturer for JpegFrameCapturer {
    fn capture(&self, stream: &MediaStream) -> BoothResult<EncodedImage> {
        let frame = stream.current_frame()?;
        if frame.width() == 0 || frame.height() == 0 {
            return Err(BoothError::capture("stream produced an empty frame"));
        }

        // Off-screen copy of the frame, sized to the source
        let mut canvas = RgbImage::new(frame.width(), frame.height());
        image::imageops::replace(&mut canvas, &frame, 0, 0);

        let encoded = self.encode(&canvas)?;
        log::info!(
            "Captured {}x{} frame ({} bytes, quality {})",
            canvas.width(),
            canvas.height(),
            encoded.len(),
            self.quality
        );
        Ok(encoded)
    }
}
