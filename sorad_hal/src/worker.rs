//! Uniform background-thread handle.
//!
//! Every producer thread in the system (GPS monitors, bearing estimator,
//! radiometer channel workers) is wrapped in a [`Worker`]: a named join
//! handle plus a shared stop flag. Cancellation is cooperative — the thread
//! body must observe the flag at its own polling granularity and return.
//! Teardown can then drive a whole roster of workers through the same
//! stop/poll/join sequence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// A named background thread with a cooperative stop flag.
pub struct Worker {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a named thread. The body receives the stop flag and should
    /// return promptly once it is raised.
    pub fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(thread_stop))?;
        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    /// Thread name, used in teardown progress logs.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raise the stop flag. Safe to call repeatedly.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Whether the thread body has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Join the thread if it is still attached. A panicked worker is
    /// absorbed here — teardown must not propagate.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}
