//! The fixed-period main loop.
//!
//! One coordinating thread, one iteration per cycle period: evaluate the
//! readiness gate, nudge the platform if the sun geometry moved, run the
//! measurement trigger, emit a single composite status line, sleep. The
//! period is target-plus-processing-time — no drift compensation, matching
//! the physical reality that a 5 s cadence on a ship does not need phase
//! lock.
//!
//! A raised interrupt flag ends the loop cleanly between (or during) any
//! sleep; a cycle error aborts it. In both cases the caller owns teardown
//! through [`crate::lifecycle::stop_all`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sorad_common::config::Config;
use sorad_common::error::CycleError;
use tracing::{debug, info, warn};

use crate::lifecycle::Handles;
use crate::motor::{self, MoveOutcome};
use crate::pacing::sleep_cancellable;
use crate::readiness;
use crate::solar::{self, LowPrecisionSun, SolarEstimator, SolarPosition};
use crate::trigger::{MeasurementTrigger, TriggerOutcome};

/// Poll interval for tracking adjustments.
const TRACKING_POLL: Duration = Duration::from_secs(2);

/// Owns the handles and per-cycle state for the lifetime of the run.
pub struct CycleRunner {
    config: Config,
    handles: Handles,
    interrupt: Arc<AtomicBool>,
    trigger: MeasurementTrigger,
    sun: Box<dyn SolarEstimator>,
    verbosity: u8,
    counter: u64,
}

impl CycleRunner {
    pub fn new(
        config: Config,
        handles: Handles,
        interrupt: Arc<AtomicBool>,
        verbosity: u8,
    ) -> Self {
        let trigger = MeasurementTrigger::new(config.sampling.min_commit_interval(), Utc::now());
        Self {
            config,
            handles,
            interrupt,
            trigger,
            sun: Box::new(LowPrecisionSun),
            verbosity,
            counter: 0,
        }
    }

    /// Swap in a different solar estimator.
    pub fn with_solar_estimator(mut self, sun: Box<dyn SolarEstimator>) -> Self {
        self.sun = sun;
        self
    }

    /// Run until interrupted (`Ok`) or a cycle error escapes (`Err`).
    /// Either way the handles stay with the runner for teardown.
    pub fn run(&mut self) -> Result<(), CycleError> {
        let period = self.config.sampling.cycle_period();
        while !self.interrupt.load(Ordering::Relaxed) {
            let status = self.cycle_once(Utc::now())?;
            info!("{status}");
            if sleep_cancellable(period, &self.interrupt) {
                break;
            }
        }
        info!("Cycle loop ended after {} iterations", self.counter);
        Ok(())
    }

    /// One iteration. Public so the scenario tests can drive the loop with
    /// simulated time.
    pub fn cycle_once(&mut self, now: DateTime<Utc>) -> Result<String, CycleError> {
        let Self {
            config,
            handles,
            interrupt,
            trigger,
            sun,
            verbosity,
            counter,
        } = self;

        *counter += 1;
        let mut message = format!("[{counter}] ");

        // Motor position, read fresh every cycle.
        let mut motor_position = match handles.motor.as_mut() {
            Some(m) => motor::get_position(m.as_mut()),
            None => None,
        };

        // Delegated predicates.
        let gps_ok = readiness::gps_ready(&handles.gps, &config.gps, now);
        let rad_ok =
            readiness::rad_ready(handles.rads.as_ref(), config.radiometers.channels.len());

        // Latest fixes, read whether or not the gate will open: heartbeat
        // records carry them too.
        let gps1 = handles.gps.first().and_then(|m| m.fix());
        let gps2 = handles.gps.get(1).and_then(|m| m.fix());

        let bearing_deg = if config.default.use_fixed_bearing {
            Some(f64::from(config.default.fixed_bearing_deg))
        } else {
            handles.bearing.as_ref().and_then(|b| b.estimate().mean_deg)
        };

        // Solar geometry and the tracking adjustment, only meaningful with
        // a current position under us.
        let mut solar_position: Option<SolarPosition> = None;
        let mut sun_ok = false;
        if gps_ok {
            if let Some(fix) = gps1 {
                let position = sun.solar_position(fix.lat, fix.lon, fix.alt, now);
                sun_ok =
                    readiness::sun_suitable(Some(position.elevation_deg), &config.sampling);
                solar_position = Some(position);

                if let Some(bearing) = bearing_deg {
                    let angles = solar::compute_motor_angles(
                        position.azimuth_deg,
                        bearing,
                        &config.motor,
                        config.sampling.view_azimuth_offset_deg,
                    );
                    info!(
                        "[{counter}] Sun Az {:.0} | El {:.1} | ViewAz [{:.1}|{:.1}] | MotAng [{:.1}|{:.1}] | Target {:.1} ({} steps)",
                        position.azimuth_deg,
                        position.elevation_deg,
                        angles.view_azimuth_ccw_deg,
                        angles.view_azimuth_cw_deg,
                        angles.achievable_ccw_deg,
                        angles.achievable_cw_deg,
                        angles.target_deg,
                        angles.target_step
                    );

                    // Hysteresis: only move when the target has drifted
                    // beyond the step threshold.
                    if sun_ok {
                        if let (Some(current), Some(motor_handle)) =
                            (motor_position, handles.motor.as_mut())
                        {
                            if (angles.target_step - current).abs() > config.motor.step_threshold {
                                info!(
                                    "[{counter}] Adjust motor angle ({current} --> {})",
                                    angles.target_step
                                );
                                let outcome = motor::move_to(
                                    motor_handle.as_mut(),
                                    angles.target_step,
                                    config.motor.step_tolerance,
                                    config.motor.move_timeout(),
                                    TRACKING_POLL,
                                    interrupt,
                                );
                                match outcome {
                                    MoveOutcome::Reached { position } => {
                                        debug!("[{counter}] Motor at {position}");
                                    }
                                    MoveOutcome::StoppedShort { position } => {
                                        warn!(
                                            "[{counter}] Motor stopped at {position}, target {}",
                                            angles.target_step
                                        );
                                    }
                                    MoveOutcome::TimedOut { .. } => {
                                        warn!("[{counter}] Motor move timed out; will retry next cycle");
                                    }
                                    MoveOutcome::CommandFailed => {
                                        warn!("[{counter}] Motor rejected the rotate command");
                                    }
                                }
                                if let Some(position) = outcome.position() {
                                    motor_position = Some(position);
                                }
                            }
                        }
                    }
                }
            }
        }

        let motor_ok = motor_position.is_some();
        let gate = readiness::compose(gps_ok, motor_ok, rad_ok, sun_ok);
        message.push_str(&gate.status);

        match (bearing_deg, solar_position) {
            (Some(bearing), Some(sp)) => message.push_str(&format!(
                ", ShBe: {bearing:.0}, SuAz: {:.0}, SuEl: {:.1}",
                sp.azimuth_deg, sp.elevation_deg
            )),
            _ => message.push_str(", ShBe: -, SuAz: -, SuEl: -"),
        }
        if let (Some(g1), Some(g2)) = (gps1, gps2) {
            message.push_str(&format!(
                ", Speed {:.1} nSat [{}|{}]",
                g1.speed, g1.satellites, g2.satellites
            ));
        }

        let outcome = trigger.tick(
            gate.is_go(),
            gps1,
            gps2,
            bearing_deg,
            solar_position,
            handles.rads.as_ref(),
            &mut handles.db,
            *verbosity,
            now,
        )?;
        match outcome {
            TriggerOutcome::Recorded {
                trigger_id,
                record_id,
                channels,
            } => message.push_str(&format!(
                ", Trig: {trigger_id} [{}] ({channels} channels)",
                fmt_record_id(record_id)
            )),
            TriggerOutcome::Heartbeat {
                trigger_id,
                record_id,
            } => message.push_str(&format!(
                ", NotReady | GPS Recorded: {trigger_id} [{}]",
                fmt_record_id(record_id)
            )),
            TriggerOutcome::Suppressed => {
                message.push_str(&format!(", NotReady: {}", now.format("%H:%M:%S")));
            }
            TriggerOutcome::NoFixes => message.push_str(", NotReady: no fixes to record"),
        }

        Ok(message)
    }

    /// The gate/trigger state, for tests.
    pub fn last_commit_time(&self) -> DateTime<Utc> {
        self.trigger.last_commit_time()
    }

    /// Access the handles (teardown runs against these).
    pub fn handles_mut(&mut self) -> &mut Handles {
        &mut self.handles
    }
}

fn fmt_record_id(record_id: Option<i64>) -> String {
    record_id.map_or_else(|| "-".to_string(), |id| id.to_string())
}
