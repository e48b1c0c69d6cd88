//! Deterministic stand-ins for the booth capabilities, used by unit tests.

use async_trait::async_trait;
use image::{ImageBuffer, RgbImage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Semaphore};

use crate::camera::FrameCapturer;
use crate::camera_controller::{MediaSource, MediaStream, VideoTrack};
use crate::countdown::{CompleteFn, CountdownHandle, CountdownTimer, TickFn};
use crate::encoded::EncodedImage;
use crate::error::{BoothError, BoothResult};
use crate::submission::SubmissionClient;

// ============================================================================
// MEDIA
// ============================================================================

pub struct FakeTrack {
    width: u32,
    height: u32,
    live: AtomicBool,
}

impl FakeTrack {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            live: AtomicBool::new(true),
        }
    }
}

impl VideoTrack for FakeTrack {
    fn current_frame(&self) -> BoothResult<RgbImage> {
        if !self.is_live() {
            return Err(BoothError::capture("track stopped"));
        }
        Ok(ImageBuffer::from_fn(self.width, self.height, |x, y| {
            image::Rgb([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8])
        }))
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Camera double that records every stream it hands out.
#[derive(Default)]
pub struct FakeMedia {
    fail: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    issued: Mutex<Vec<MediaStream>>,
    max_live: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquisitions wait until `open_gate` is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> usize {
        self.issued.lock().unwrap().len()
    }

    pub fn live_count(&self) -> usize {
        self.issued.lock().unwrap().iter().filter(|s| s.is_live()).count()
    }

    /// Highest number of simultaneously live streams ever observed.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Acquisitions currently waiting inside `acquire`.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `acquire` calls ever observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn open_stream(&self) -> BoothResult<MediaStream> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| BoothError::camera("gate closed"))?
                .forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BoothError::camera("permission denied"));
        }
        let stream = MediaStream::new(Arc::new(FakeTrack::new(8, 10)));
        let mut issued = self.issued.lock().unwrap();
        issued.push(stream.clone());
        let live = issued.iter().filter(|s| s.is_live()).count();
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(stream)
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn acquire(&self) -> BoothResult<MediaStream> {
        let overlapping = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(overlapping, Ordering::SeqCst);
        let result = self.open_stream().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ============================================================================
// CAPTURE
// ============================================================================

#[derive(Default)]
pub struct FakeCapturer {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeCapturer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl FrameCapturer for FakeCapturer {
    fn capture(&self, stream: &MediaStream) -> BoothResult<EncodedImage> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(BoothError::capture("draw failed"));
        }
        stream.current_frame()?;
        Ok(EncodedImage::new(format!("frame-{}", n).into_bytes(), "image/jpeg"))
    }
}

// ============================================================================
// COUNTDOWN (logical clock)
// ============================================================================

enum Event {
    Tick(u32),
    Complete,
}

struct Pending {
    handle: CountdownHandle,
    events: VecDeque<(u64, Event)>,
    on_tick: TickFn,
    on_complete: Option<CompleteFn>,
}

#[derive(Default)]
struct ManualState {
    now: u64,
    active: Option<CountdownHandle>,
    pending: Option<Pending>,
    started: usize,
}

/// Countdown whose clock only moves when the test calls `advance`.
#[derive(Default)]
pub struct ManualCountdown {
    state: Mutex<ManualState>,
}

impl ManualCountdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> usize {
        self.state.lock().unwrap().started
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active.is_some()
    }

    /// Move the clock forward, firing every due callback in order. Callbacks
    /// run with no lock held so they may start or cancel countdowns.
    pub fn advance(&self, secs: u64) {
        let target = self.state.lock().unwrap().now + secs;
        loop {
            let mut pending = {
                let mut state = self.state.lock().unwrap();
                match state.pending.take() {
                    Some(p) => p,
                    None => {
                        state.now = target;
                        return;
                    }
                }
            };

            let due = pending.events.front().map(|(at, _)| *at);
            let Some(at) = due.filter(|at| *at <= target) else {
                let mut state = self.state.lock().unwrap();
                state.pending = Some(pending);
                state.now = target;
                return;
            };
            let Some((_, event)) = pending.events.pop_front() else {
                return;
            };
            self.state.lock().unwrap().now = at;

            match event {
                Event::Tick(n) => {
                    (pending.on_tick)(n);
                    let mut state = self.state.lock().unwrap();
                    if state.active == Some(pending.handle) && state.pending.is_none() {
                        state.pending = Some(pending);
                    }
                }
                Event::Complete => {
                    self.state.lock().unwrap().active = None;
                    if let Some(done) = pending.on_complete.take() {
                        done();
                    }
                }
            }
        }
    }
}

impl CountdownTimer for ManualCountdown {
    fn start(&self, seconds: u32, on_tick: TickFn, on_complete: CompleteFn) -> CountdownHandle {
        let handle = CountdownHandle::next();
        let mut state = self.state.lock().unwrap();
        let now = state.now;
        let mut events: VecDeque<(u64, Event)> = (0..seconds)
            .map(|elapsed| (now + elapsed as u64, Event::Tick(seconds - elapsed)))
            .collect();
        events.push_back((now + seconds as u64, Event::Complete));

        state.active = Some(handle);
        state.pending = Some(Pending {
            handle,
            events,
            on_tick,
            on_complete: Some(on_complete),
        });
        state.started += 1;
        handle
    }

    fn cancel(&self, handle: CountdownHandle) {
        let mut state = self.state.lock().unwrap();
        if state.active == Some(handle) {
            state.active = None;
            state.pending = None;
        }
    }
}

// ============================================================================
// SUBMISSION
// ============================================================================

enum Scripted {
    Ready(BoothResult<EncodedImage>),
    Gated(oneshot::Receiver<BoothResult<EncodedImage>>),
}

/// Relay double answering from a queue of scripted replies.
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<EncodedImage>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, result: BoothResult<EncodedImage>) {
        self.script.lock().unwrap().push_back(Scripted::Ready(result));
    }

    /// Queue a reply the test releases later through the returned sender.
    pub fn gated(&self) -> oneshot::Sender<BoothResult<EncodedImage>> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().unwrap().push_back(Scripted::Gated(rx));
        tx
    }

    pub fn calls(&self) -> Vec<EncodedImage> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionClient for ScriptedClient {
    async fn submit(&self, image: &EncodedImage) -> BoothResult<EncodedImage> {
        self.calls.lock().unwrap().push(image.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Ready(result)) => result,
            Some(Scripted::Gated(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(BoothError::network("reply dropped"))),
            None => Err(BoothError::network("no scripted reply")),
        }
    }
}

pub fn artifact(tag: &str) -> EncodedImage {
    EncodedImage::new(format!("certificate-{}", tag).into_bytes(), "image/jpeg")
}

pub fn backend_error(status: u16, message: &str) -> BoothError {
    BoothError::Backend {
        status,
        message: Some(message.to_string()),
        details: Some(serde_json::json!({ "error": message })),
    }
}
