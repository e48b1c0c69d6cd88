use async_trait::async_trait;
use image::{ImageBuffer, RgbImage};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::{sleep, Duration};

use crate::config::CameraConfig;
use crate::error::{BoothError, BoothResult};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// A live video source held open by an acquired stream.
pub trait VideoTrack: Send + Sync {
    /// Latest decoded frame at the track's native resolution.
    fn current_frame(&self) -> BoothResult<RgbImage>;
    /// Stop the track. Must be idempotent.
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// Handle to an acquired camera stream.
#[derive(Clone)]
pub struct MediaStream {
    id: u64,
    track: Arc<dyn VideoTrack>,
}

impl MediaStream {
    pub fn new(track: Arc<dyn VideoTrack>) -> Self {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            track,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn current_frame(&self) -> BoothResult<RgbImage> {
        self.track.current_frame()
    }

    pub fn is_live(&self) -> bool {
        self.track.is_live()
    }

    pub fn stop(&self) {
        self.track.stop();
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Owner of the camera hardware. At most one stream is live at a time; the
/// controller guarantees `release` before any new `acquire`.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self) -> BoothResult<MediaStream>;

    /// Stop every track of the stream. Safe to call more than once.
    fn release(&self, stream: &MediaStream) {
        stream.stop();
    }
}

// ============================================================================
// RASPBERRY PI CAMERA (rpicam-still timelapse loop)
// ============================================================================

/// Camera source backed by `rpicam-still` writing a rolling preview file.
pub struct RpicamSource {
    width: u32,
    height: u32,
    quality: u8,
    preview_path: PathBuf,
    warmup: Duration,
}

impl RpicamSource {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            width: config.preview_width,
            height: config.preview_height,
            quality: config.preview_quality,
            preview_path: config.preview_path.clone(),
            warmup: Duration::from_millis(config.warmup_ms),
        }
    }

    async fn check_available() -> BoothResult<()> {
        match tokio::process::Command::new("rpicam-still")
            .arg("--help")
            .output()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                log::warn!("rpicam-still not found: {}", e);
                Err(BoothError::camera(format!("rpicam-still not found: {}", e)))
            }
        }
    }
}

#[async_trait]
impl MediaSource for RpicamSource {
    async fn acquire(&self) -> BoothResult<MediaStream> {
        log::info!("Starting Pi camera preview...");
        Self::check_available().await?;

        if self.preview_path.exists() {
            let _ = tokio::fs::remove_file(&self.preview_path).await;
        }

        let path = self.preview_path.to_string_lossy().to_string();
        let args = [
            "-o", &path,
            "--width", &self.width.to_string(),
            "--height", &self.height.to_string(),
            "--quality", &self.quality.to_string(),
            "--timeout", "0",      // Run until killed
            "--timelapse", "100",  // Overwrite the preview file every 100ms
            "--nopreview",
        ];
        log::info!("Preview command: rpicam-still {}", args.join(" "));

        let child = Command::new("rpicam-still")
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BoothError::camera(format!("failed to start rpicam-still: {}", e)))?;

        let track = Arc::new(RpicamTrack {
            child: Mutex::new(Some(child)),
            preview_path: self.preview_path.clone(),
            live: AtomicBool::new(true),
        });

        // Give the sensor a moment; a busy or missing camera makes rpicam exit early
        sleep(self.warmup).await;
        if let Some(status) = track.exit_status() {
            track.stop();
            return Err(BoothError::camera(format!(
                "rpicam-still exited with {} (camera missing or busy)",
                status
            )));
        }

        log::info!("Camera preview started successfully");
        Ok(MediaStream::new(track))
    }
}

struct RpicamTrack {
    child: Mutex<Option<Child>>,
    preview_path: PathBuf,
    live: AtomicBool,
}

impl RpicamTrack {
    fn exit_status(&self) -> Option<std::process::ExitStatus> {
        let mut guard = self.child.lock().ok()?;
        guard.as_mut()?.try_wait().ok().flatten()
    }
}

impl VideoTrack for RpicamTrack {
    fn current_frame(&self) -> BoothResult<RgbImage> {
        if !self.is_live() {
            return Err(BoothError::capture("camera stream already stopped"));
        }
        load_frame(&self.preview_path)
    }

    fn stop(&self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.child.lock() {
            if let Some(mut process) = guard.take() {
                let _ = process.kill();
                let _ = process.wait();
            }
        }
        if self.preview_path.exists() {
            let _ = std::fs::remove_file(&self.preview_path);
        }
        log::info!("Camera preview stopped");
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for RpicamTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

fn load_frame(path: &Path) -> BoothResult<RgbImage> {
    match image::open(path) {
        Ok(img) => {
            let rgb_img = img.to_rgb8();
            log::debug!("Loaded preview frame: {}x{}", rgb_img.width(), rgb_img.height());
            Ok(rgb_img)
        }
        Err(e) => Err(BoothError::capture(format!(
            "failed to read frame from {}: {}",
            path.display(),
            e
        ))),
    }
}

// ============================================================================
// SIMULATED CAMERA (desktop development)
// ============================================================================

/// Test-pattern camera for machines without a Pi camera.
pub struct SimulatedSource {
    width: u32,
    height: u32,
    warmup: Duration,
}

impl SimulatedSource {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            width: config.preview_width,
            height: config.preview_height,
            warmup: Duration::from_millis(config.warmup_ms),
        }
    }
}

#[async_trait]
impl MediaSource for SimulatedSource {
    async fn acquire(&self) -> BoothResult<MediaStream> {
        log::warn!("Camera not available - streaming test pattern");
        sleep(self.warmup).await;
        Ok(MediaStream::new(Arc::new(TestPatternTrack {
            width: self.width,
            height: self.height,
            epoch: Instant::now(),
            live: AtomicBool::new(true),
        })))
    }
}

struct TestPatternTrack {
    width: u32,
    height: u32,
    epoch: Instant,
    live: AtomicBool,
}

impl VideoTrack for TestPatternTrack {
    fn current_frame(&self) -> BoothResult<RgbImage> {
        if !self.is_live() {
            return Err(BoothError::capture("camera stream already stopped"));
        }
        let time = self.epoch.elapsed().as_secs_f32();
        let (w, h) = (self.width as f32, self.height as f32);
        Ok(ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let r = ((x as f32 / w * 255.0) + (time * 1.5).sin() * 50.0) as u8;
            let g = ((y as f32 / h * 255.0) + (time * 0.9).cos() * 50.0) as u8;
            let b = (((x + y) as f32 / (w + h) * 255.0) + (time * 2.1).sin() * 50.0) as u8;
            image::Rgb([r.saturating_add(60), g.saturating_add(60), b.saturating_add(60)])
        }))
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            log::info!("Simulated camera stopped");
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}
