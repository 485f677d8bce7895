//! The four-predicate measurement gate.
//!
//! Recomputed from scratch every cycle; nothing here carries state between
//! iterations. Each predicate is delegated to the component that owns the
//! data (GPS monitors, radiometer manager, solar estimator) — this module
//! only composes them and renders the status string that goes into every
//! cycle's log line.

use chrono::{DateTime, Utc};
use sorad_common::config::{GpsConfig, SamplingConfig};
use sorad_common::types::ReadinessFlags;
use sorad_hal::gps::GpsMonitor;
use sorad_hal::radiometer::RadiometerManager;

/// Gate state for one cycle.
#[derive(Debug, Clone)]
pub struct Readiness {
    pub flags: ReadinessFlags,
    /// Human-readable per-predicate summary, e.g. `GPS: 1, Rad: 0, ...`.
    pub status: String,
}

impl Readiness {
    /// The composite gate: all four predicates hold.
    #[inline]
    pub fn is_go(&self) -> bool {
        self.flags.is_go()
    }
}

/// Both GPS monitors report fresh, valid fixes. With fewer than two
/// monitors running this is permanently false.
pub fn gps_ready(gps: &[GpsMonitor], config: &GpsConfig, now: DateTime<Utc>) -> bool {
    gps.len() >= 2
        && gps[..2]
            .iter()
            .all(|m| m.is_ready(config.fix_max_age(), config.min_satellites, now))
}

/// All configured radiometer channels respond. A manager running fewer
/// workers than the configuration names (a sensor that never enumerated)
/// can never be ready.
pub fn rad_ready(rads: Option<&RadiometerManager>, configured_channels: usize) -> bool {
    match rads {
        Some(manager) => manager.channel_count() == configured_channels && manager.ready(),
        None => false,
    }
}

/// Solar elevation inside the acceptance band.
pub fn sun_suitable(elevation_deg: Option<f64>, sampling: &SamplingConfig) -> bool {
    elevation_deg.is_some_and(|el| {
        el >= sampling.min_sun_elevation_deg && el <= sampling.max_sun_elevation_deg
    })
}

/// Compose the gate and its status string from already-evaluated predicates.
pub fn compose(gps: bool, motor: bool, rad: bool, sun: bool) -> Readiness {
    let mut flags = ReadinessFlags::empty();
    flags.set(ReadinessFlags::GPS, gps);
    flags.set(ReadinessFlags::MOTOR, motor);
    flags.set(ReadinessFlags::RAD, rad);
    flags.set(ReadinessFlags::SUN, sun);

    let mark = |ok: bool| if ok { "1" } else { "0" };
    let status = format!(
        "GPS: {}, Rad: {}, Motor: {}, Sun: {}",
        mark(gps),
        mark(rad),
        mark(motor),
        mark(sun)
    );

    Readiness { flags, status }
}
