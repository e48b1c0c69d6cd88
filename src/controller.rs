use chrono::{DateTime, Local};
use image::RgbImage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::camera::FrameCapturer;
use crate::camera_controller::{MediaSource, MediaStream};
use crate::config::CaptureConfig;
use crate::countdown::{CompleteFn, CountdownHandle, CountdownTimer, TickFn};
use crate::session::{CameraState, CaptureSession, Phase, SubmissionState};
use crate::submission::SubmissionClient;

/// The hardware and network capabilities the controller drives.
#[derive(Clone)]
pub struct Capabilities {
    pub media: Arc<dyn MediaSource>,
    pub capturer: Arc<dyn FrameCapturer>,
    pub timer: Arc<dyn CountdownTimer>,
    pub client: Arc<dyn SubmissionClient>,
}

/// Orchestrates camera, countdown, capture and submission into one
/// `CaptureSession`. Cheap to clone; clones share the same session.
///
/// Asynchronous completions carry the tokens that were current when their
/// operation was issued. A completion whose tokens no longer match (after a
/// retake, a stop, or a newer operation of the same kind) is discarded.
#[derive(Clone)]
pub struct CaptureController {
    shared: Arc<Shared>,
}

struct Shared {
    caps: Capabilities,
    settings: CaptureConfig,
    inner: Mutex<Inner>,
    /// Held across `MediaSource::acquire` so at most one acquisition is in flight.
    acquire_permit: tokio::sync::Mutex<()>,
    updates: watch::Sender<CaptureSession>,
}

struct Inner {
    session: CaptureSession,
    stream: Option<MediaStream>,
    countdown: Option<CountdownHandle>,
    /// Bumped on retake and shutdown.
    generation: u64,
    acquire_seq: u64,
    countdown_seq: u64,
    submission_seq: u64,
}

impl CaptureController {
    pub fn new(caps: Capabilities, settings: CaptureConfig) -> Self {
        let session = CaptureSession::new();
        let (updates, _) = watch::channel(session.clone());
        Self {
            shared: Arc::new(Shared {
                caps,
                settings,
                inner: Mutex::new(Inner {
                    session,
                    stream: None,
                    countdown: None,
                    generation: 0,
                    acquire_seq: 0,
                    countdown_seq: 0,
                    submission_seq: 0,
                }),
                acquire_permit: tokio::sync::Mutex::new(()),
                updates,
            }),
        }
    }

    /// Receiver that sees every published session state.
    pub fn subscribe(&self) -> watch::Receiver<CaptureSession> {
        self.shared.updates.subscribe()
    }

    pub fn snapshot(&self) -> CaptureSession {
        self.lock().session.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().session.phase()
    }

    /// Current viewfinder frame, if the camera is on.
    pub fn preview_frame(&self) -> Option<RgbImage> {
        let stream = self.lock().stream.clone()?;
        stream.current_frame().ok()
    }

    /// Clear the error overlay raised at `raised_at`. A newer error stays.
    pub fn dismiss_error(&self, raised_at: DateTime<Local>) {
        let mut inner = self.lock();
        if inner.session.overlay.as_ref().map(|o| o.at) != Some(raised_at) {
            return;
        }
        inner.session.clear_error();
        self.publish(&inner);
    }

    // ------------------------------------------------------------------
    // Camera
    // ------------------------------------------------------------------

    /// Idle → CameraOn, or camera error. Ignored while the camera is
    /// starting/on or while an image is held.
    pub async fn start_camera(&self) {
        let (generation, seq, previous) = {
            let mut inner = self.lock();
            let session = &inner.session;
            if matches!(session.camera_state, CameraState::Starting | CameraState::On)
                || session.captured_image.is_some()
            {
                log::debug!("Ignoring start camera in phase {:?}", session.phase());
                return;
            }
            let previous = self.detach_camera(&mut inner);
            inner.acquire_seq += 1;
            inner.session.camera_state = CameraState::Starting;
            inner.session.clear_error();
            self.publish(&inner);
            (inner.generation, inner.acquire_seq, previous)
        };
        self.release_stream(previous);

        // An earlier acquisition must settle (and release its stream) first
        let _permit = self.shared.acquire_permit.lock().await;
        if !self.acquire_is_current(generation, seq) {
            log::debug!("Camera request superseded while waiting for the camera");
            return;
        }

        log::info!("Starting camera...");
        let result = self.shared.caps.media.acquire().await;

        let stale = {
            let mut inner = self.lock();
            let current = inner.generation == generation && inner.acquire_seq == seq;
            match result {
                Ok(stream) if !current => Some(stream),
                Ok(stream) => {
                    log::info!("Camera on (stream {})", stream.id());
                    inner.stream = Some(stream);
                    inner.session.camera_state = CameraState::On;
                    self.publish(&inner);
                    None
                }
                Err(e) if !current => {
                    log::debug!("Ignoring stale camera failure: {}", e);
                    None
                }
                Err(e) => {
                    log::warn!("Camera acquisition failed: {}", e);
                    inner.session.camera_state = CameraState::Error;
                    inner.session.set_error(e);
                    self.publish(&inner);
                    None
                }
            }
        };
        if let Some(stream) = stale {
            log::debug!("Releasing stale camera stream {}", stream.id());
            self.release_stream(Some(stream));
        }
    }

    /// Release the camera and abandon any countdown or pending acquisition.
    pub fn stop_camera(&self) {
        let stream = {
            let mut inner = self.lock();
            if inner.session.camera_state == CameraState::Off && inner.stream.is_none() {
                return;
            }
            let stream = self.detach_camera(&mut inner);
            inner.acquire_seq += 1;
            inner.session.camera_state = CameraState::Off;
            log::info!("Camera stopped");
            self.publish(&inner);
            stream
        };
        self.release_stream(stream);
    }

    // ------------------------------------------------------------------
    // Countdown and capture
    // ------------------------------------------------------------------

    /// CameraOn → Counting with the configured countdown. Restarts a running
    /// countdown.
    pub fn request_capture(&self) {
        self.start_countdown(self.shared.settings.countdown_seconds);
    }

    /// Capture the current frame without a countdown.
    pub fn capture_now(&self) {
        self.start_countdown(0);
    }

    fn start_countdown(&self, seconds: u32) {
        let (generation, seq) = {
            let mut inner = self.lock();
            if inner.session.camera_state != CameraState::On
                || inner.stream.is_none()
                || inner.session.captured_image.is_some()
            {
                log::debug!("Ignoring capture request in phase {:?}", inner.session.phase());
                return;
            }
            self.cancel_countdown(&mut inner);
            inner.countdown_seq += 1;
            inner.session.clear_error();
            if seconds > 0 {
                inner.session.countdown_value = Some(seconds);
            }
            self.publish(&inner);
            (inner.generation, inner.countdown_seq)
        };

        if seconds == 0 {
            self.complete_countdown(generation, seq);
            return;
        }

        log::info!("Countdown started: {}s", seconds);
        let on_tick: TickFn = {
            let controller = self.clone();
            Box::new(move |remaining: u32| controller.countdown_tick(generation, seq, remaining))
        };
        let on_complete: CompleteFn = {
            let controller = self.clone();
            Box::new(move || controller.complete_countdown(generation, seq))
        };
        let handle = self.shared.caps.timer.start(seconds, on_tick, on_complete);

        let mut inner = self.lock();
        if inner.generation == generation
            && inner.countdown_seq == seq
            && inner.session.countdown_value.is_some()
        {
            inner.countdown = Some(handle);
        } else {
            self.shared.caps.timer.cancel(handle);
        }
    }

    fn countdown_tick(&self, generation: u64, seq: u64, remaining: u32) {
        let mut inner = self.lock();
        if inner.generation != generation
            || inner.countdown_seq != seq
            || inner.session.countdown_value.is_none()
        {
            return;
        }
        log::debug!("Countdown: {}", remaining);
        inner.session.countdown_value = Some(remaining);
        self.publish(&inner);
    }

    /// Counting → Captured: snapshot the frame, then release the camera.
    fn complete_countdown(&self, generation: u64, seq: u64) {
        let stream = {
            let mut inner = self.lock();
            if inner.generation != generation || inner.countdown_seq != seq {
                log::debug!("Ignoring stale countdown completion");
                return;
            }
            inner.countdown = None;
            match inner.stream.clone() {
                Some(stream) => stream,
                None => return,
            }
        };

        let result = self.shared.caps.capturer.capture(&stream);

        let released = {
            let mut inner = self.lock();
            let same_stream = inner.stream.as_ref().map(MediaStream::id) == Some(stream.id());
            if inner.generation != generation || inner.countdown_seq != seq || !same_stream {
                log::debug!("Discarding capture superseded while encoding");
                return;
            }
            match result {
                Ok(image) => {
                    log::info!("Photo captured ({} bytes)", image.len());
                    let released = self.detach_camera(&mut inner);
                    inner.session.captured_image = Some(image);
                    inner.session.submission_state = SubmissionState::Idle;
                    inner.session.result_artifact = None;
                    inner.session.clear_error();
                    self.publish(&inner);
                    released
                }
                Err(e) => {
                    log::warn!("Capture failed: {}", e);
                    inner.session.countdown_value = None;
                    inner.session.set_error(e);
                    self.publish(&inner);
                    return;
                }
            }
        };
        self.release_stream(released);

        if self.shared.settings.auto_submit {
            self.spawn_submit();
        }
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Captured → Submitting → Result, or back to Captured with an error.
    ///
    /// Returns false when the request was rejected: nothing captured, or a
    /// submission is already in flight.
    pub async fn submit(&self) -> bool {
        let (image, generation, seq) = {
            let mut inner = self.lock();
            if inner.session.is_submitting() {
                log::info!("Submission already in flight; ignoring request");
                return false;
            }
            let Some(image) = inner.session.captured_image.clone() else {
                log::debug!("Nothing captured to submit");
                return false;
            };
            inner.submission_seq += 1;
            inner.session.submission_state = SubmissionState::Pending;
            inner.session.result_artifact = None;
            inner.session.clear_error();
            self.publish(&inner);
            (image, inner.generation, inner.submission_seq)
        };

        log::info!("Generating certificate...");
        let result = self.shared.caps.client.submit(&image).await;

        let mut inner = self.lock();
        if inner.generation != generation || inner.submission_seq != seq {
            log::debug!("Discarding stale submission result");
            return true;
        }
        match result {
            Ok(artifact) => {
                log::info!("Certificate received ({} bytes)", artifact.len());
                inner.session.submission_state = SubmissionState::Succeeded;
                inner.session.result_artifact = Some(artifact);
            }
            Err(e) => {
                log::warn!("Submission failed: {}", e);
                inner.session.submission_state = SubmissionState::Failed;
                inner.session.set_error(e);
            }
        }
        self.publish(&inner);
        true
    }

    /// Re-submit the stored capture after a result or a failed attempt.
    pub async fn regenerate(&self) -> bool {
        let state = self.lock().session.submission_state;
        if !matches!(state, SubmissionState::Succeeded | SubmissionState::Failed) {
            log::debug!("Ignoring regenerate with submission state {:?}", state);
            return false;
        }
        log::info!("Regenerating certificate from stored capture");
        self.submit().await
    }

    fn spawn_submit(&self) {
        match Handle::try_current() {
            Ok(runtime) => {
                let controller = self.clone();
                runtime.spawn(async move {
                    controller.submit().await;
                });
            }
            Err(e) => log::warn!("Auto submit skipped, no async runtime: {}", e),
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Any → CameraOn: drop the capture and result and reopen the camera.
    pub async fn retake(&self) {
        let previous = {
            let mut inner = self.lock();
            inner.generation += 1;
            let previous = self.detach_camera(&mut inner);
            inner.acquire_seq += 1;
            inner.session = CaptureSession::new();
            log::info!("Retake: session reset");
            self.publish(&inner);
            previous
        };
        self.release_stream(previous);
        self.start_camera().await;
    }

    /// Release the camera and invalidate every pending completion.
    pub fn shutdown(&self) {
        let stream = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.acquire_seq += 1;
            let stream = self.detach_camera(&mut inner);
            self.publish(&inner);
            stream
        };
        self.release_stream(stream);
        log::info!("Capture controller shut down");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire_is_current(&self, generation: u64, seq: u64) -> bool {
        let inner = self.lock();
        inner.generation == generation && inner.acquire_seq == seq
    }

    fn cancel_countdown(&self, inner: &mut Inner) {
        if let Some(handle) = inner.countdown.take() {
            self.shared.caps.timer.cancel(handle);
        }
        inner.countdown_seq += 1;
        inner.session.countdown_value = None;
    }

    /// Cancel the countdown and take the stream out of the session. The
    /// caller releases the returned stream once the lock is dropped.
    fn detach_camera(&self, inner: &mut Inner) -> Option<MediaStream> {
        self.cancel_countdown(inner);
        if inner.session.camera_state != CameraState::Error {
            inner.session.camera_state = CameraState::Off;
        }
        inner.stream.take()
    }

    /// Stop a detached stream. Never called with the session lock held.
    fn release_stream(&self, stream: Option<MediaStream>) {
        if let Some(stream) = stream {
            self.shared.caps.media.release(&stream);
            log::debug!("Released camera stream {}", stream.id());
        }
    }

    fn publish(&self, inner: &Inner) {
        if let Err(violation) = inner.session.validate() {
            log::error!("Session invariant violated: {}", violation);
            debug_assert!(false, "session invariant violated: {}", violation);
        }
        self.shared.updates.send_replace(inner.session.clone());
    }
}
