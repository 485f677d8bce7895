//! Measurement triggering and heartbeat rate limiting.
//!
//! With the gate open: mint a trigger id, snapshot both GPS fixes, run the
//! synchronized sampling barrier, persist the full record. With the gate
//! closed: stay quiet — except that at least one metadata-only heartbeat
//! record goes out per commit interval, so the archive shows the platform
//! was alive (and where it was) even through hours of unsuitable
//! conditions.
//!
//! `last_commit_time` is the single piece of state here. It advances on
//! every would-be commit even when persistence is disabled, so the rate
//! limiting behaves identically with and without a database.

use chrono::{DateTime, Utc};
use sorad_common::error::CycleError;
use sorad_common::types::{GpsFix, TriggerClock, TriggerId, TriggerRecord};
use sorad_hal::radiometer::RadiometerManager;
use tracing::debug;

use crate::db::Db;
use crate::solar::SolarPosition;

/// What one trigger evaluation did.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// Gate open: full measurement persisted.
    Recorded {
        trigger_id: TriggerId,
        record_id: Option<i64>,
        channels: usize,
    },
    /// Gate closed, interval elapsed: metadata-only record persisted.
    Heartbeat {
        trigger_id: TriggerId,
        record_id: Option<i64>,
    },
    /// Gate closed, inside the interval: no record, no I/O.
    Suppressed,
    /// Heartbeat was due but no GPS snapshots exist yet to record.
    NoFixes,
}

/// Owns the trigger clock and the rate-limit state.
pub struct MeasurementTrigger {
    clock: TriggerClock,
    last_commit: DateTime<Utc>,
    min_interval: chrono::Duration,
}

impl MeasurementTrigger {
    /// `now` seeds `last_commit_time`, so the first heartbeat can only
    /// happen a full interval after startup.
    pub fn new(min_interval: std::time::Duration, now: DateTime<Utc>) -> Self {
        Self {
            clock: TriggerClock::new(),
            last_commit: now,
            min_interval: chrono::Duration::from_std(min_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        }
    }

    /// Evaluate one cycle.
    ///
    /// # Errors
    ///
    /// A sampling-barrier fault or a failed commit is a cycle error — the
    /// caller tears the system down rather than retrying.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        gate_open: bool,
        gps1: Option<GpsFix>,
        gps2: Option<GpsFix>,
        bearing_deg: Option<f64>,
        solar: Option<SolarPosition>,
        rads: Option<&RadiometerManager>,
        db: &mut Option<Db>,
        verbosity: u8,
        now: DateTime<Utc>,
    ) -> Result<TriggerOutcome, CycleError> {
        if gate_open {
            let (Some(gps1), Some(gps2)) = (gps1, gps2) else {
                return Err(CycleError::Sampling(
                    "gate open without GPS snapshots".to_string(),
                ));
            };
            let Some(rads) = rads else {
                return Err(CycleError::Sampling(
                    "gate open without a radiometer manager".to_string(),
                ));
            };

            let trigger_id = self.clock.mint(now);
            let set = rads
                .sample_all(trigger_id)
                .map_err(|e| CycleError::Sampling(e.to_string()))?;
            let channels = set.samples.len();

            let record = TriggerRecord {
                trigger_id,
                gps1,
                gps2,
                bearing_deg,
                solar_azimuth_deg: solar.map(|s| s.azimuth_deg),
                solar_elevation_deg: solar.map(|s| s.elevation_deg),
                samples: Some(set.samples),
            };
            let record_id = self.persist(db, verbosity, &record)?;
            self.last_commit = now;
            return Ok(TriggerOutcome::Recorded {
                trigger_id,
                record_id,
                channels,
            });
        }

        // Gate closed: rate-limited heartbeat.
        if now.signed_duration_since(self.last_commit) < self.min_interval {
            return Ok(TriggerOutcome::Suppressed);
        }

        let (Some(gps1), Some(gps2)) = (gps1, gps2) else {
            debug!("Heartbeat due but no GPS snapshots available");
            return Ok(TriggerOutcome::NoFixes);
        };

        let trigger_id = self.clock.mint(now);
        let record = TriggerRecord {
            trigger_id,
            gps1,
            gps2,
            bearing_deg,
            solar_azimuth_deg: solar.map(|s| s.azimuth_deg),
            solar_elevation_deg: solar.map(|s| s.elevation_deg),
            samples: None,
        };
        let record_id = self.persist(db, verbosity, &record)?;
        self.last_commit = now;
        Ok(TriggerOutcome::Heartbeat {
            trigger_id,
            record_id,
        })
    }

    fn persist(
        &mut self,
        db: &mut Option<Db>,
        verbosity: u8,
        record: &TriggerRecord,
    ) -> Result<Option<i64>, CycleError> {
        match db {
            Some(db) => db
                .commit(verbosity, record)
                .map(Some)
                .map_err(|e| CycleError::Commit(e.to_string())),
            None => Ok(None),
        }
    }

    /// Time of the last committed (or would-be committed) record.
    #[inline]
    pub fn last_commit_time(&self) -> DateTime<Utc> {
        self.last_commit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use sorad_hal::radiometer::RadiometerChannel;
    use sorad_hal::sim::{SimMode, SimulatedRadiometer};
    use std::time::Duration;

    fn fix(now: DateTime<Utc>) -> GpsFix {
        GpsFix {
            lat: 50.33,
            lon: -4.16,
            alt: 10.0,
            speed: 1.0,
            satellites: 9,
            timestamp: now,
        }
    }

    fn manager(modes: &[SimMode]) -> RadiometerManager {
        let channels: Vec<Box<dyn RadiometerChannel>> = modes
            .iter()
            .enumerate()
            .map(|(i, m)| {
                Box::new(SimulatedRadiometer::new(&format!("SAM_{i}"), *m))
                    as Box<dyn RadiometerChannel>
            })
            .collect();
        RadiometerManager::start(channels, Duration::from_millis(400)).unwrap()
    }

    fn stop(mut manager: RadiometerManager) {
        manager.request_stop();
        for w in manager.workers_mut() {
            w.join();
        }
    }

    #[test]
    fn closed_gate_inside_window_is_silent() {
        let t0 = Utc::now();
        let mut trigger = MeasurementTrigger::new(Duration::from_secs(60), t0);
        let now = t0 + ChronoDuration::seconds(59);
        let outcome = trigger
            .tick(false, Some(fix(now)), Some(fix(now)), None, None, None, &mut None, 3, now)
            .unwrap();
        assert_eq!(outcome, TriggerOutcome::Suppressed);
        assert_eq!(trigger.last_commit_time(), t0);
    }

    #[test]
    fn heartbeat_fires_at_exactly_the_interval() {
        let t0 = Utc::now();
        let mut trigger = MeasurementTrigger::new(Duration::from_secs(60), t0);
        let now = t0 + ChronoDuration::seconds(60);
        let outcome = trigger
            .tick(false, Some(fix(now)), Some(fix(now)), Some(190.0), None, None, &mut None, 3, now)
            .unwrap();
        assert!(matches!(outcome, TriggerOutcome::Heartbeat { .. }));
        assert_eq!(trigger.last_commit_time(), now);

        // Immediately after, the window has reset.
        let outcome = trigger
            .tick(false, Some(fix(now)), Some(fix(now)), None, None, None, &mut None, 3, now)
            .unwrap();
        assert_eq!(outcome, TriggerOutcome::Suppressed);
    }

    #[test]
    fn at_most_one_heartbeat_per_rolling_window() {
        let t0 = Utc::now();
        let mut trigger = MeasurementTrigger::new(Duration::from_secs(60), t0);
        let mut heartbeats = 0;
        // Ten minutes of closed gate, evaluated every 5 simulated seconds.
        for step in 1..=120 {
            let now = t0 + ChronoDuration::seconds(5 * step);
            let outcome = trigger
                .tick(false, Some(fix(now)), Some(fix(now)), None, None, None, &mut None, 3, now)
                .unwrap();
            if matches!(outcome, TriggerOutcome::Heartbeat { .. }) {
                heartbeats += 1;
            }
        }
        assert_eq!(heartbeats, 10);
    }

    #[test]
    fn open_gate_records_all_responding_channels() {
        let t0 = Utc::now();
        let manager = manager(&[SimMode::Normal, SimMode::Normal]);
        let mut trigger = MeasurementTrigger::new(Duration::from_secs(60), t0);
        let solar = SolarPosition {
            azimuth_deg: 150.0,
            elevation_deg: 40.0,
        };
        let outcome = trigger
            .tick(
                true,
                Some(fix(t0)),
                Some(fix(t0)),
                Some(185.0),
                Some(solar),
                Some(&manager),
                &mut None,
                3,
                t0,
            )
            .unwrap();
        assert!(matches!(
            outcome,
            TriggerOutcome::Recorded { channels: 2, .. }
        ));
        stop(manager);
    }

    #[test]
    fn dead_channel_mid_sampling_is_a_cycle_error() {
        let t0 = Utc::now();
        let manager = manager(&[SimMode::Normal, SimMode::Dead]);
        let mut trigger = MeasurementTrigger::new(Duration::from_secs(60), t0);
        let err = trigger
            .tick(
                true,
                Some(fix(t0)),
                Some(fix(t0)),
                None,
                None,
                Some(&manager),
                &mut None,
                3,
                t0,
            )
            .unwrap_err();
        assert!(matches!(err, CycleError::Sampling(_)));
        stop(manager);
    }

    #[test]
    fn heartbeat_without_fixes_writes_nothing() {
        let t0 = Utc::now();
        let mut trigger = MeasurementTrigger::new(Duration::from_secs(60), t0);
        let now = t0 + ChronoDuration::seconds(120);
        let outcome = trigger
            .tick(false, None, None, None, None, None, &mut None, 3, now)
            .unwrap();
        assert_eq!(outcome, TriggerOutcome::NoFixes);
    }
}
