//! Data carried between the orchestrator and the device layer.
//!
//! Everything here is a plain value snapshot: producer threads publish these,
//! the control cycle copies them out and works on the copies. None of these
//! types hold device handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── GPS ────────────────────────────────────────────────────────────

/// One position fix as published by a GPS monitor thread.
///
/// Fields mirror what the receivers report; `timestamp` is the fix time,
/// not the time the monitor read it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    /// Latitude [deg], north positive.
    pub lat: f64,
    /// Longitude [deg], east positive.
    pub lon: f64,
    /// Altitude above mean sea level [m].
    pub alt: f64,
    /// Speed over ground [m/s].
    pub speed: f64,
    /// Number of satellites used in the fix.
    pub satellites: u32,
    /// Fix timestamp (UTC).
    pub timestamp: DateTime<Utc>,
}

/// Heading statistics derived from the geometry of the two GPS antennas.
///
/// `None` until the bearing estimator has accumulated enough samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BearingEstimate {
    /// Circular mean of the recent bearing samples [deg].
    pub mean_deg: Option<f64>,
    /// Median of the recent bearing samples [deg].
    pub median_deg: Option<f64>,
    /// Number of samples currently in the window.
    pub samples: usize,
}

// ─── Readiness ──────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Per-cycle readiness predicates.
    ///
    /// The measurement gate is the conjunction of all four flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReadinessFlags: u8 {
        /// Both GPS monitors report fresh, valid fixes.
        const GPS   = 0b0001;
        /// The motor position was readable this cycle.
        const MOTOR = 0b0010;
        /// All configured radiometer channels respond.
        const RAD   = 0b0100;
        /// Solar elevation is inside the acceptance band.
        const SUN   = 0b1000;
    }
}

impl ReadinessFlags {
    /// True when every predicate holds — measurements may be triggered.
    #[inline]
    pub const fn is_go(&self) -> bool {
        self.contains(Self::all())
    }
}

impl Default for ReadinessFlags {
    fn default() -> Self {
        Self::empty()
    }
}

// ─── Trigger identifiers ────────────────────────────────────────────

/// Identifier correlating one synchronized measurement across channels
/// and its persisted record. Wall-clock microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TriggerId(i64);

impl TriggerId {
    /// Raw microseconds since the Unix epoch.
    #[inline]
    pub const fn as_micros(&self) -> i64 {
        self.0
    }

    /// The trigger time as a UTC timestamp.
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.0).unwrap_or_default()
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.datetime().format("%Y-%m-%dT%H:%M:%S%.6fZ"))
    }
}

/// Mints trigger ids from the wall clock.
///
/// Ids are strictly increasing even if the system clock stalls or steps
/// backwards between cycles: a mint that would not advance past the previous
/// id is bumped by one microsecond instead.
#[derive(Debug, Default)]
pub struct TriggerClock {
    last_us: i64,
}

impl TriggerClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next trigger id.
    pub fn mint(&mut self, now: DateTime<Utc>) -> TriggerId {
        let now_us = now.timestamp_micros();
        self.last_us = if now_us > self.last_us {
            now_us
        } else {
            self.last_us + 1
        };
        TriggerId(self.last_us)
    }
}

// ─── Measurement records ────────────────────────────────────────────

/// One channel's contribution to a synchronized measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSample {
    /// Radiometer channel identifier (e.g. serial number).
    pub channel_id: String,
    /// Integration time the channel chose [ms].
    pub integration_time_ms: u32,
    /// Raw spectrum counts.
    pub spectrum: Vec<u16>,
}

/// Everything persisted for one cycle: a full measurement when the gate was
/// open, or a metadata-only heartbeat (`samples == None`) when it was not.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRecord {
    pub trigger_id: TriggerId,
    pub gps1: GpsFix,
    pub gps2: GpsFix,
    /// Vessel heading used for the solar geometry [deg], if known.
    pub bearing_deg: Option<f64>,
    pub solar_azimuth_deg: Option<f64>,
    pub solar_elevation_deg: Option<f64>,
    /// Per-channel spectra for responding channels, or `None` for a
    /// metadata-only heartbeat record.
    pub samples: Option<Vec<ChannelSample>>,
}

impl TriggerRecord {
    /// True when this record carries no spectra.
    #[inline]
    pub fn is_metadata_only(&self) -> bool {
        self.samples.is_none()
    }
}
