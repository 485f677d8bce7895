//! Monotonic deadlines and cancellable sleeps.
//!
//! Every wait in the orchestrator goes through these two pieces: poll loops
//! are bounded by a [`Deadline`] on the monotonic clock (wall-clock steps
//! cannot stretch or shrink them), and sleeps are sliced so a raised
//! interrupt flag wakes the coordinator within one slice instead of at the
//! end of a full cycle period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Granularity at which a sleeping coordinator re-checks the interrupt flag.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// A monotonic-clock deadline.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    /// Whether the deadline has passed.
    #[inline]
    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left, zero once expired.
    #[inline]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// Sleep for `duration`, waking early if `interrupt` is raised.
///
/// Returns `true` when the sleep was cut short by the flag.
pub fn sleep_cancellable(duration: Duration, interrupt: &AtomicBool) -> bool {
    let deadline = Deadline::after(duration);
    loop {
        if interrupt.load(Ordering::Relaxed) {
            return true;
        }
        let remaining = deadline.remaining();
        if remaining.is_zero() {
            return false;
        }
        std::thread::sleep(remaining.min(SLEEP_SLICE));
    }
}
