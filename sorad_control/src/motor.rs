//! Motor control loop.
//!
//! One rotate command, then poll until the platform is inside the tolerance
//! band, the stage reports idle, or the wall-clock budget runs out. The
//! budget is a monotonic deadline, never an iteration count — serial
//! latency varies too much for counting to mean anything.
//!
//! Fail-safe policy, applied at the call sites below by name: an unreadable
//! position or moving-flag is treated as *still moving*. A flaky RS-485
//! link must delay the platform, not convince us it has arrived.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use sorad_hal::motor::MotorController;
use tracing::{debug, info, warn};

use crate::pacing::{Deadline, sleep_cancellable};

/// How a bounded move ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Position inside the tolerance band.
    Reached { position: i32 },
    /// The stage reports idle but sits outside the band (stall, slip, or a
    /// rejected step count).
    StoppedShort { position: i32 },
    /// The budget elapsed first. The caller re-evaluates next cycle.
    TimedOut { position: Option<i32> },
    /// The rotate command itself was not accepted.
    CommandFailed,
}

impl MoveOutcome {
    /// Last known position, if any reading succeeded.
    pub fn position(&self) -> Option<i32> {
        match self {
            Self::Reached { position } | Self::StoppedShort { position } => Some(*position),
            Self::TimedOut { position } => *position,
            Self::CommandFailed => None,
        }
    }
}

/// Read the current step position, absorbing transient failures.
///
/// `None` means "unknown this cycle" — the readiness gate turns that into
/// motor-not-ready; nothing is raised.
pub fn get_position(motor: &mut dyn MotorController) -> Option<i32> {
    match motor.get_position() {
        Ok(position) => Some(position),
        Err(e) => {
            debug!("Motor position read failed: {e}");
            None
        }
    }
}

/// Issue one rotate command and poll until done, idle, or timeout.
pub fn move_to(
    motor: &mut dyn MotorController,
    target: i32,
    tolerance: i32,
    timeout: Duration,
    poll_interval: Duration,
    interrupt: &AtomicBool,
) -> MoveOutcome {
    if let Err(e) = motor.rotate_to(target) {
        warn!("Rotate command to {target} failed: {e}");
        return MoveOutcome::CommandFailed;
    }

    let deadline = Deadline::after(timeout);
    let mut last_position = None;

    loop {
        match motor.is_moving(target, tolerance) {
            Ok(reading) => {
                last_position = Some(reading.position);
                if (reading.position - target).abs() <= tolerance {
                    return MoveOutcome::Reached {
                        position: reading.position,
                    };
                }
                if !reading.moving {
                    return MoveOutcome::StoppedShort {
                        position: reading.position,
                    };
                }
                info!("..moving motor.. {} --> {target}", reading.position);
            }
            Err(e) => {
                // Assume-still-moving: an unreadable flag keeps us waiting.
                debug!("Moving-flag read failed ({e}); assuming still moving");
                info!("..moving motor.. ? --> {target}");
            }
        }

        if deadline.expired() {
            return MoveOutcome::TimedOut {
                position: last_position,
            };
        }
        if sleep_cancellable(poll_interval.min(deadline.remaining()), interrupt) {
            // Interrupted mid-move: report what we know and let teardown run.
            return MoveOutcome::TimedOut {
                position: last_position,
            };
        }
    }
}
