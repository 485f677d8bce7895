//! GPS fix monitors.
//!
//! One monitor thread per receiver. The thread polls its [`FixSource`] and
//! publishes the latest fix into a shared slot; the orchestrator reads the
//! slot whenever it likes and never waits on the thread. A transient read
//! failure leaves the previous fix in place — staleness is what the
//! readiness predicate then catches.
//!
//! Wire-format decoding is not this crate's business: a [`FixSource`] hands
//! over decoded [`GpsFix`] values, whether they come from a receiver-specific
//! driver or from the simulator in [`crate::sim`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sorad_common::error::DeviceError;
use sorad_common::types::GpsFix;
use tracing::debug;

use crate::worker::Worker;

/// Producer of decoded position fixes.
pub trait FixSource: Send {
    /// Identifier used for thread naming and logs.
    fn label(&self) -> &str;

    /// Poll for the next fix. `Ok(None)` means nothing new yet.
    fn read_fix(&mut self) -> Result<Option<GpsFix>, DeviceError>;
}

/// Latest-fix slot shared between a monitor thread and its readers.
pub type SharedFix = Arc<Mutex<Option<GpsFix>>>;

/// A running GPS monitor thread.
pub struct GpsMonitor {
    label: String,
    fix: SharedFix,
    worker: Worker,
}

impl GpsMonitor {
    /// Spawn a monitor over the given source, polling at `poll_interval`.
    pub fn start(
        mut source: Box<dyn FixSource>,
        poll_interval: Duration,
    ) -> Result<Self, DeviceError> {
        let label = source.label().to_string();
        let fix: SharedFix = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&fix);
        let thread_name = format!("gps-{label}");

        let worker = Worker::spawn(&thread_name, move |stop| {
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                match source.read_fix() {
                    Ok(Some(new_fix)) => {
                        *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(new_fix);
                    }
                    Ok(None) => {}
                    Err(e) => debug!("GPS {} read failed: {e}", source.label()),
                }
                std::thread::sleep(poll_interval);
            }
            debug!("GPS monitor {} stopping", source.label());
        })
        .map_err(|e| DeviceError::Io(format!("spawn gps monitor: {e}")))?;

        Ok(Self { label, fix, worker })
    }

    /// Receiver label.
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Latest published fix, if any.
    pub fn fix(&self) -> Option<GpsFix> {
        *self.fix.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Clone of the shared fix slot, for the bearing estimator.
    pub fn shared_fix(&self) -> SharedFix {
        Arc::clone(&self.fix)
    }

    /// Readiness predicate: a fix exists, is recent, and used enough
    /// satellites.
    pub fn is_ready(&self, max_age: Duration, min_satellites: u32, now: DateTime<Utc>) -> bool {
        match self.fix() {
            Some(fix) => {
                let age = now.signed_duration_since(fix.timestamp);
                let fresh = age >= chrono::Duration::zero()
                    && age.to_std().map(|a| a <= max_age).unwrap_or(false);
                if !fresh {
                    debug!("GPS {} fix is stale ({}s old)", self.label, age.num_seconds());
                }
                fresh
                    && fix.satellites >= min_satellites
                    && fix.lat.is_finite()
                    && fix.lon.is_finite()
            }
            None => false,
        }
    }

    /// Borrow the underlying worker for the teardown roster.
    pub fn worker_mut(&mut self) -> &mut Worker {
        &mut self.worker
    }

    /// Raise the stop flag without joining.
    pub fn request_stop(&self) {
        self.worker.request_stop();
    }
}
