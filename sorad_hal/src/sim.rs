//! Software device implementations.
//!
//! Everything the orchestrator can talk to has a simulated twin here, used
//! for development without the platform attached and by the test suites.
//! The motor twin converges toward its target a few steps per query, so
//! poll loops exercise their real timing logic against it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use sorad_common::error::DeviceError;
use sorad_common::types::{ChannelSample, GpsFix, TriggerId};

use crate::gps::FixSource;
use crate::motor::{MotionReading, MotorController};
use crate::radiometer::RadiometerChannel;

// ─── GPS ────────────────────────────────────────────────────────────

enum FixMode {
    /// Return the configured fix verbatim.
    Steady,
    /// Return the configured fix restamped to the current time.
    Live,
    /// Never produce a fix.
    Silent,
}

/// Simulated position source.
pub struct SimulatedFixSource {
    label: String,
    fix: GpsFix,
    mode: FixMode,
}

impl SimulatedFixSource {
    /// Always returns `fix` exactly as given (timestamp included).
    pub fn steady(label: &str, fix: GpsFix) -> Self {
        Self {
            label: label.to_string(),
            fix,
            mode: FixMode::Steady,
        }
    }

    /// Returns `fix` with the timestamp refreshed on every read.
    pub fn live(label: &str, fix: GpsFix) -> Self {
        Self {
            label: label.to_string(),
            fix,
            mode: FixMode::Live,
        }
    }

    /// Produces no fixes at all.
    pub fn silent(label: &str) -> Self {
        Self {
            label: label.to_string(),
            fix: GpsFix {
                lat: 0.0,
                lon: 0.0,
                alt: 0.0,
                speed: 0.0,
                satellites: 0,
                timestamp: Utc::now(),
            },
            mode: FixMode::Silent,
        }
    }
}

impl FixSource for SimulatedFixSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn read_fix(&mut self) -> Result<Option<GpsFix>, DeviceError> {
        match self.mode {
            FixMode::Steady => Ok(Some(self.fix)),
            FixMode::Live => {
                let mut fix = self.fix;
                fix.timestamp = Utc::now();
                Ok(Some(fix))
            }
            FixMode::Silent => Ok(None),
        }
    }
}

// ─── Motor ──────────────────────────────────────────────────────────

/// Observable state of the simulated rotation stage.
#[derive(Debug, Clone)]
pub struct MotorSimState {
    /// Current step position.
    pub position: i32,
    /// Step the stage is converging toward.
    pub target: i32,
    /// Device moving-flag.
    pub moving: bool,
    /// Steps covered per position/moving query.
    pub step_rate: i32,
    /// Make every read fail (exercises the assume-still-moving policy).
    pub fail_reads: bool,
    /// Freeze the stage: rotate commands are accepted but the position
    /// never changes and the moving-flag stays raised.
    pub stuck: bool,
    /// Every target handed to `rotate_to`, in order.
    pub rotate_commands: Vec<i32>,
}

/// Simulated rotation stage. Clone-free: the controller is handed to the
/// orchestrator boxed, tests keep the shared state for probing.
pub struct SimulatedMotor {
    state: Arc<Mutex<MotorSimState>>,
}

impl SimulatedMotor {
    pub fn new(position: i32, step_rate: i32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MotorSimState {
                position,
                target: position,
                moving: false,
                step_rate: step_rate.max(1),
                fail_reads: false,
                stuck: false,
                rotate_commands: Vec::new(),
            })),
        }
    }

    /// Shared state handle for test probing and fault injection.
    pub fn state(&self) -> Arc<Mutex<MotorSimState>> {
        Arc::clone(&self.state)
    }

    fn advance(state: &mut MotorSimState) {
        if state.stuck || !state.moving {
            return;
        }
        let delta = state.target - state.position;
        let step = delta.clamp(-state.step_rate, state.step_rate);
        state.position += step;
        if state.position == state.target {
            state.moving = false;
        }
    }
}

impl MotorController for SimulatedMotor {
    fn get_position(&mut self) -> Result<i32, DeviceError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.fail_reads {
            return Err(DeviceError::Timeout("simulated position read".to_string()));
        }
        Self::advance(&mut state);
        Ok(state.position)
    }

    fn rotate_to(&mut self, target: i32) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.rotate_commands.push(target);
        state.target = target;
        state.moving = true;
        Ok(())
    }

    fn is_moving(&mut self, _target: i32, _tolerance: i32) -> Result<MotionReading, DeviceError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.fail_reads {
            return Err(DeviceError::Timeout("simulated moving-flag read".to_string()));
        }
        Self::advance(&mut state);
        Ok(MotionReading {
            moving: state.moving,
            position: state.position,
        })
    }
}

// ─── Radiometer ─────────────────────────────────────────────────────

/// Behavior of a simulated radiometer channel.
#[derive(Debug, Clone, Copy)]
pub enum SimMode {
    /// Responds promptly with a deterministic spectrum.
    Normal,
    /// Responds after the given delay (drives skip-on-deadline paths).
    Slow(Duration),
    /// Reports a recoverable device error on every sample.
    Erroring,
    /// Terminally gone: first sample reports `NotAvailable` and the worker
    /// exits.
    Dead,
}

/// Simulated radiometer channel.
pub struct SimulatedRadiometer {
    id: String,
    mode: SimMode,
    acquisitions: u32,
}

impl SimulatedRadiometer {
    /// Spectral pixels per simulated acquisition.
    pub const PIXELS: usize = 256;

    pub fn new(id: &str, mode: SimMode) -> Self {
        Self {
            id: id.to_string(),
            mode,
            acquisitions: 0,
        }
    }

    fn spectrum(&self) -> Vec<u16> {
        (0..Self::PIXELS)
            .map(|i| (i as u16).wrapping_mul(7).wrapping_add(self.acquisitions as u16))
            .collect()
    }
}

impl RadiometerChannel for SimulatedRadiometer {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_responsive(&mut self) -> bool {
        // A Dead channel still answers pings; it fails mid-acquisition.
        // Once its worker has exited, the manager's queue hang-up is what
        // reports it unready.
        true
    }

    fn sample(&mut self, _trigger: TriggerId) -> Result<ChannelSample, DeviceError> {
        self.acquisitions += 1;
        match self.mode {
            SimMode::Normal => Ok(ChannelSample {
                channel_id: self.id.clone(),
                integration_time_ms: 256,
                spectrum: self.spectrum(),
            }),
            SimMode::Slow(delay) => {
                std::thread::sleep(delay);
                Ok(ChannelSample {
                    channel_id: self.id.clone(),
                    integration_time_ms: 1024,
                    spectrum: self.spectrum(),
                })
            }
            SimMode::Erroring => Err(DeviceError::Io(format!(
                "simulated acquisition failure on {}",
                self.id
            ))),
            SimMode::Dead => Err(DeviceError::NotAvailable(format!(
                "simulated dead sensor {}",
                self.id
            ))),
        }
    }
}
