use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{sleep, Duration};

static NEXT_COUNTDOWN_ID: AtomicU64 = AtomicU64::new(1);

pub type TickFn = Box<dyn FnMut(u32) + Send + 'static>;
pub type CompleteFn = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CountdownHandle(u64);

impl CountdownHandle {
    pub fn next() -> Self {
        Self(NEXT_COUNTDOWN_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Delayed capture trigger.
///
/// `on_tick` receives `seconds, seconds - 1, ..., 1`, one per second starting
/// immediately; `on_complete` fires once, a second after the last tick.
/// Starting a new countdown cancels the running one. A cancelled countdown
/// fires nothing further.
pub trait CountdownTimer: Send + Sync {
    fn start(&self, seconds: u32, on_tick: TickFn, on_complete: CompleteFn) -> CountdownHandle;
    fn cancel(&self, handle: CountdownHandle);
}

/// Countdown driven by tokio's timer. Each tick is a scheduled wakeup, the
/// caller is never blocked.
pub struct TokioCountdown {
    runtime: Handle,
    tick: Duration,
    active: Mutex<Option<(CountdownHandle, AbortHandle)>>,
}

impl TokioCountdown {
    pub fn new(runtime: Handle) -> Self {
        Self::with_tick(runtime, Duration::from_secs(1))
    }

    pub fn with_tick(runtime: Handle, tick: Duration) -> Self {
        Self {
            runtime,
            tick,
            active: Mutex::new(None),
        }
    }

    fn take_active(&self) -> Option<(CountdownHandle, AbortHandle)> {
        self.active.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl CountdownTimer for TokioCountdown {
    fn start(&self, seconds: u32, mut on_tick: TickFn, on_complete: CompleteFn) -> CountdownHandle {
        if let Some((previous, abort)) = self.take_active() {
            log::debug!("Cancelling countdown {} for a new one", previous.id());
            abort.abort();
        }

        let handle = CountdownHandle::next();
        let tick = self.tick;
        let task = self.runtime.spawn(async move {
            for remaining in (1..=seconds).rev() {
                on_tick(remaining);
                sleep(tick).await;
            }
            on_complete();
        });

        if let Ok(mut slot) = self.active.lock() {
            *slot = Some((handle, task.abort_handle()));
        }
        handle
    }

    fn cancel(&self, handle: CountdownHandle) {
        if let Ok(mut slot) = self.active.lock() {
            if matches!(*slot, Some((active, _)) if active == handle) {
                if let Some((_, abort)) = slot.take() {
                    abort.abort();
                    log::debug!("Countdown {} cancelled", handle.id());
                }
            }
        }
    }
}
