//! Waiting between requests, and cancelling a harvest while it waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep slice, so cancellation is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared cancellation signal. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Strategy for waiting. Injected so tests can run on simulated time.
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`. Returns `false` if cancelled before it elapsed.
    fn sleep(&self, duration: Duration, cancel: &CancellationFlag) -> bool;
}

/// Blocks the current thread, waking periodically to check for cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancellationFlag) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Records requested waits instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    waits: Arc<std::sync::Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every wait requested so far, in order.
    pub fn waits(&self) -> Vec<Duration> {
        self.waits
            .lock()
            .map(|waits| waits.clone())
            .unwrap_or_default()
    }

    /// Sum of all requested waits.
    pub fn total(&self) -> Duration {
        self.waits().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancellationFlag) -> bool {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(duration);
        }
        !cancel.is_cancelled()
    }
}
