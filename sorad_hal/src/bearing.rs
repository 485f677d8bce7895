//! Dual-antenna heading estimator.
//!
//! The vessel's heading is the great-circle bearing from the stern antenna
//! to the bow antenna. One background thread watches both monitors' shared
//! fix slots, appends a bearing sample whenever either receiver publishes a
//! new fix, and maintains mean/median statistics over a fixed window. The
//! orchestrator reads the statistics through a lock-guarded snapshot.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sorad_common::error::DeviceError;
use sorad_common::types::{BearingEstimate, GpsFix};
use tracing::debug;

use crate::gps::SharedFix;
use crate::worker::Worker;

/// Bearing samples kept in the window.
const WINDOW: usize = 32;

/// A running bearing estimator thread.
pub struct BearingEstimator {
    estimate: Arc<Mutex<BearingEstimate>>,
    worker: Worker,
}

impl BearingEstimator {
    /// Spawn the estimator over the stern and bow fix slots.
    pub fn start(
        stern: SharedFix,
        bow: SharedFix,
        poll_interval: Duration,
    ) -> Result<Self, DeviceError> {
        let estimate = Arc::new(Mutex::new(BearingEstimate::default()));
        let published = Arc::clone(&estimate);

        let worker = Worker::spawn("bearing-estimator", move |stop| {
            let mut window: heapless::Deque<f64, WINDOW> = heapless::Deque::new();
            let mut last_seen: Option<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> =
                None;

            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let stern_fix = *stern.lock().unwrap_or_else(|e| e.into_inner());
                let bow_fix = *bow.lock().unwrap_or_else(|e| e.into_inner());

                if let (Some(s), Some(b)) = (stern_fix, bow_fix) {
                    let pair = (s.timestamp, b.timestamp);
                    let advanced = last_seen != Some(pair);
                    if advanced {
                        last_seen = Some(pair);
                        if let Some(sample) = initial_bearing_deg(&s, &b) {
                            if window.is_full() {
                                window.pop_front();
                            }
                            // Capacity just checked.
                            let _ = window.push_back(sample);
                            let stats = BearingEstimate {
                                mean_deg: circular_mean_deg(window.iter().copied()),
                                median_deg: median_deg(window.iter().copied()),
                                samples: window.len(),
                            };
                            *published.lock().unwrap_or_else(|e| e.into_inner()) = stats;
                        }
                    }
                }
                std::thread::sleep(poll_interval);
            }
            debug!("Bearing estimator stopping");
        })
        .map_err(|e| DeviceError::Io(format!("spawn bearing estimator: {e}")))?;

        Ok(Self { estimate, worker })
    }

    /// Lock-guarded snapshot of the current statistics.
    pub fn estimate(&self) -> BearingEstimate {
        *self.estimate.lock().unwrap_or_else(|e| e.into_inner())
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

/// Great-circle initial bearing from `from` to `to`, degrees in [0, 360).
///
/// `None` when the two fixes coincide — two antennas on top of each other
/// carry no heading information.
pub fn initial_bearing_deg(from: &GpsFix, to: &GpsFix) -> Option<f64> {
    if from.lat == to.lat && from.lon == to.lon {
        return None;
    }
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let delta_lambda = (to.lon - from.lon).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();
    Some(y.atan2(x).to_degrees().rem_euclid(360.0))
}

/// Circular mean of bearing samples, degrees in [0, 360).
fn circular_mean_deg(samples: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sin_sum = 0.0;
    let mut cos_sum = 0.0;
    let mut count = 0usize;
    for deg in samples {
        let rad = deg.to_radians();
        sin_sum += rad.sin();
        cos_sum += rad.cos();
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sin_sum.atan2(cos_sum).to_degrees().rem_euclid(360.0))
    }
}

/// Plain median of the raw samples.
fn median_deg(samples: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = samples.collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}
