//! Startup sequencing and best-effort teardown.
//!
//! `init_all` brings the platform up in a fixed order: pins OFF →
//! persistence → port discovery → motor → GPS monitors → bearing estimator
//! → homing → radiometer manager. Whatever was constructed by the time a
//! step fails is handed back to the caller, whose duty is to run
//! [`stop_all`] over it before propagating the error.
//!
//! `stop_all` is the one function that must always work: idempotent, never
//! raises, every step independently best-effort. Its last act is to drive a
//! uniform roster of worker handles through stop/poll/join until no
//! background thread remains, logging stragglers every half second.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use sorad_common::config::{Config, GpsConfig};
use sorad_common::error::InitError;
use sorad_hal::bearing::BearingEstimator;
use sorad_hal::gps::{FixSource, GpsMonitor};
use sorad_hal::motor::MotorController;
use sorad_hal::pins::PinBank;
use sorad_hal::ports::{self, DiscoveredPort};
use sorad_hal::radiometer::{RadiometerChannel, RadiometerManager};
use sorad_hal::sim::{SimMode, SimulatedFixSource, SimulatedMotor, SimulatedRadiometer};
use sorad_hal::worker::Worker;
use sorad_common::types::GpsFix;
use tracing::{info, warn};

use crate::db::Db;
use crate::motor::{self, MoveOutcome};

/// Homing acceptance band [steps].
const HOMING_TOLERANCE: i32 = 300;
/// Wall-clock budget for the homing move.
const HOMING_TIMEOUT: Duration = Duration::from_secs(5);
/// Poll interval while homing.
const HOMING_POLL: Duration = Duration::from_secs(1);
/// Poll interval of the GPS monitor threads.
const GPS_POLL: Duration = Duration::from_millis(500);
/// Poll interval of the bearing estimator thread.
const BEARING_POLL: Duration = Duration::from_millis(500);
/// How often teardown reports the threads it is still waiting for.
const JOIN_POLL: Duration = Duration::from_millis(500);

/// Every live handle the orchestrator works with. Option-heavy on purpose:
/// a partially-initialized set must still be valid input to [`stop_all`].
#[derive(Default)]
pub struct Handles {
    pub pins: Option<PinBank>,
    pub motor: Option<Box<dyn MotorController>>,
    pub gps: Vec<GpsMonitor>,
    pub bearing: Option<BearingEstimator>,
    pub rads: Option<RadiometerManager>,
    pub db: Option<Db>,
}

/// A failed startup: the error plus whatever was already constructed.
pub struct InitFailure {
    pub handles: Handles,
    pub error: InitError,
}

impl std::fmt::Debug for InitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitFailure")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Startup result; the caller must run [`stop_all`] on the failure's
/// partial handles before propagating.
pub type InitResult = Result<Handles, Box<InitFailure>>;

macro_rules! fail {
    ($handles:expr, $error:expr) => {
        return Err(Box::new(InitFailure {
            handles: $handles,
            error: $error,
        }))
    };
}

/// Bring the whole platform up. See the module docs for the order.
///
/// With `simulate` set, no serial hardware is touched: the motor, both GPS
/// sources, and every configured radiometer channel run as their software
/// twins.
pub fn init_all(config: &Config, simulate: bool, interrupt: &AtomicBool) -> InitResult {
    let mut handles = Handles::default();

    // Output pins first: whatever else happens, they are OFF from here on.
    match PinBank::open(&config.gpio) {
        Ok(pins) => handles.pins = Some(pins),
        Err(e) => fail!(handles, InitError::Pins(e.to_string())),
    }

    if config.database.used {
        match Db::open(&config.database) {
            Ok(db) => handles.db = Some(db),
            Err(e) => fail!(handles, e),
        }
    } else {
        info!("Persistence disabled in config");
    }

    let ports = if simulate {
        Vec::new()
    } else {
        match ports::discover() {
            Ok(ports) => {
                info!("Discovered {} serial ports", ports.len());
                ports
            }
            Err(e) => fail!(handles, InitError::PortDiscovery(e.to_string())),
        }
    };

    // Motor.
    if simulate {
        // Start the simulated stage off-home so homing actually runs.
        handles.motor = Some(Box::new(SimulatedMotor::new(
            config.motor.home_pos + 5000,
            2000,
        )));
    } else {
        let Some(port) = ports::match_one(&ports, &config.motor.port_hint) else {
            fail!(
                handles,
                InitError::DeviceMatch {
                    device: "motor",
                    hint: config.motor.port_hint.clone(),
                }
            );
        };
        info!("Motor on {} ({})", port.name, port.description);
        match sorad_hal::motor::SerialMotor::open(&port.name, config.motor.baud_rate) {
            Ok(motor) => handles.motor = Some(Box::new(motor)),
            Err(e) => fail!(handles, InitError::Motor(e.to_string())),
        }
    }

    // GPS monitors, one per source.
    let sources = if simulate {
        simulated_fix_sources()
    } else {
        let matched = ports::match_all(&ports, &config.gps.port_hint);
        if matched.is_empty() {
            warn!(
                "No serial port matches '{}'; check GPS sensors and connection settings",
                config.gps.port_hint
            );
        }
        matched
            .into_iter()
            .filter_map(|port| {
                let source = hardware_fix_source(port, &config.gps);
                if source.is_none() {
                    warn!("No fix decoder available for {}; skipping", port.name);
                }
                source
            })
            .collect()
    };
    if sources.is_empty() {
        warn!("Zero GPS monitors running; gps_ready will stay false");
    }
    for source in sources {
        match GpsMonitor::start(source, GPS_POLL) {
            Ok(monitor) => {
                info!("GPS monitor {} running", monitor.label());
                handles.gps.push(monitor);
            }
            Err(e) => fail!(handles, InitError::Gps(e.to_string())),
        }
    }

    // Bearing estimator over the first two monitors.
    if handles.gps.len() >= 2 {
        match BearingEstimator::start(
            handles.gps[0].shared_fix(),
            handles.gps[1].shared_fix(),
            BEARING_POLL,
        ) {
            Ok(estimator) => handles.bearing = Some(estimator),
            Err(e) => fail!(handles, InitError::Gps(e.to_string())),
        }
    } else {
        info!("Fewer than two GPS monitors; bearing estimator not started");
    }

    // Homing: read the position, move home if we are anywhere else.
    if let Err(e) = home_motor(&mut handles, config.motor.home_pos, interrupt) {
        fail!(handles, e);
    }

    // Radiometer manager last.
    let channels: Vec<Box<dyn RadiometerChannel>> = if simulate {
        config
            .radiometers
            .channels
            .iter()
            .map(|id| {
                Box::new(SimulatedRadiometer::new(id, SimMode::Normal))
                    as Box<dyn RadiometerChannel>
            })
            .collect()
    } else {
        warn!("No radiometer channel driver available; rad_ready will stay false");
        Vec::new()
    };
    match RadiometerManager::start(channels, config.radiometers.sample_timeout()) {
        Ok(manager) => {
            info!("Radiometry manager running {} channels", manager.channel_count());
            handles.rads = Some(manager);
        }
        Err(e) => fail!(handles, InitError::Radiometer(e.to_string())),
    }

    Ok(handles)
}

fn home_motor(
    handles: &mut Handles,
    home_pos: i32,
    interrupt: &AtomicBool,
) -> Result<(), InitError> {
    let Some(motor_handle) = handles.motor.as_mut() else {
        return Err(InitError::Motor("no motor handle".to_string()));
    };
    let motor_handle = motor_handle.as_mut();

    let Some(position) = motor::get_position(motor_handle) else {
        return Err(InitError::Motor(
            "no response to a position query".to_string(),
        ));
    };

    if position == home_pos {
        info!("Motor in home position");
        return Ok(());
    }

    info!("Homing motor.. {position} --> {home_pos}");
    let outcome = motor::move_to(
        motor_handle,
        home_pos,
        HOMING_TOLERANCE,
        HOMING_TIMEOUT,
        HOMING_POLL,
        interrupt,
    );
    match outcome {
        MoveOutcome::Reached { .. } => {
            info!("..done");
            Ok(())
        }
        other => Err(InitError::HomingIncomplete {
            position: other.position(),
            home: home_pos,
        }),
    }
}

/// Two software receivers a boat-length apart in Plymouth Sound, heading
/// roughly north.
fn simulated_fix_sources() -> Vec<Box<dyn FixSource>> {
    let stern = GpsFix {
        lat: 50.36500,
        lon: -4.14500,
        alt: 4.0,
        speed: 2.0,
        satellites: 10,
        timestamp: chrono::Utc::now(),
    };
    let mut bow = stern;
    bow.lat += 0.00009;
    vec![
        Box::new(SimulatedFixSource::live("gps1", stern)),
        Box::new(SimulatedFixSource::live("gps2", bow)),
    ]
}

/// Receiver-specific fix decoders plug in here; none are built into this
/// workspace — the wire protocol belongs to the receiver driver, and the
/// readiness gate degrades to permanently-not-ready without one.
fn hardware_fix_source(
    _port: &DiscoveredPort,
    _config: &GpsConfig,
) -> Option<Box<dyn FixSource>> {
    None
}

/// Tear everything down, best-effort and idempotent. Never raises; every
/// failure is logged and the remaining steps still run.
pub fn stop_all(handles: &mut Handles) {
    // Persistence connection first.
    if let Some(db) = handles.db.take() {
        info!("Closing persistence connection");
        db.close();
    }

    // Pins OFF and released, regardless of anything else.
    if let Some(pins) = handles.pins.as_mut() {
        if let Err(e) = pins.all_off() {
            warn!("Pin OFF write failed: {e}");
        }
        pins.release();
    }

    // Ask every producer to stop.
    if let Some(rads) = &handles.rads {
        info!("Stopping radiometry manager threads");
        rads.request_stop();
    }
    if let Some(bearing) = &handles.bearing {
        info!("Stopping dual-gps bearing thread");
        bearing.request_stop();
    }
    for monitor in &handles.gps {
        info!("Stopping GPS monitor thread {}", monitor.label());
        monitor.request_stop();
    }

    // Converge: poll the roster until no thread remains, joining whatever
    // has finished and naming whatever has not. Unbounded on purpose.
    loop {
        let mut waiting = Vec::new();
        for worker in roster(handles) {
            if worker.is_finished() {
                worker.join();
            } else {
                waiting.push(worker.name().to_string());
            }
        }
        if waiting.is_empty() {
            break;
        }
        info!("Waiting for threads: {waiting:?}");
        std::thread::sleep(JOIN_POLL);
    }
    info!("All threads stopped");
}

/// The uniform worker roster: every background thread the manager owns.
fn roster(handles: &mut Handles) -> Vec<&mut Worker> {
    let mut roster = Vec::new();
    for monitor in &mut handles.gps {
        roster.push(monitor.worker_mut());
    }
    if let Some(bearing) = handles.bearing.as_mut() {
        roster.push(bearing.worker_mut());
    }
    if let Some(rads) = handles.rads.as_mut() {
        roster.extend(rads.workers_mut());
    }
    roster
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorad_common::config::Config;

    fn test_config() -> Config {
        let toml = r#"
[motor]
port_hint = "Motor"

[gps]
port_hint = "u-blox"

[radiometers]
channels = ["SAM_1", "SAM_2"]

[gpio]
output_pins = []
"#;
        let config: Config = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        config
    }

    #[test]
    fn simulated_init_brings_everything_up_and_homes() {
        let interrupt = AtomicBool::new(false);
        let config = test_config();
        let mut handles = init_all(&config, true, &interrupt).unwrap();

        assert_eq!(handles.gps.len(), 2);
        assert!(handles.bearing.is_some());
        assert_eq!(handles.rads.as_ref().unwrap().channel_count(), 2);

        // Homing left the stage inside the homing band.
        let position = handles.motor.as_mut().unwrap().get_position().unwrap();
        assert!((position - config.motor.home_pos).abs() <= 300);

        stop_all(&mut handles);
    }

    #[test]
    fn stop_all_twice_never_panics_and_pins_stay_off() {
        let interrupt = AtomicBool::new(false);
        let config = test_config();
        let mut handles = init_all(&config, true, &interrupt).unwrap();

        stop_all(&mut handles);
        let pins = handles.pins.as_ref().unwrap();
        assert!(pins.is_off());
        assert!(pins.is_released());

        stop_all(&mut handles);
        let pins = handles.pins.as_ref().unwrap();
        assert!(pins.is_off());
        assert!(pins.is_released());
    }

    #[test]
    fn stop_all_on_empty_handles_is_a_noop() {
        let mut handles = Handles::default();
        stop_all(&mut handles);
        stop_all(&mut handles);
    }

    #[test]
    fn stuck_stage_fails_homing_with_a_timeout() {
        let interrupt = AtomicBool::new(false);
        let motor = SimulatedMotor::new(5000, 2000);
        motor.state().lock().unwrap().stuck = true;

        let mut handles = Handles {
            motor: Some(Box::new(motor)),
            ..Handles::default()
        };
        let err = home_motor(&mut handles, 0, &interrupt).unwrap_err();
        assert!(matches!(err, InitError::HomingIncomplete { home: 0, .. }));
        stop_all(&mut handles);
    }

    #[test]
    fn unreachable_stage_fails_initialization() {
        let interrupt = AtomicBool::new(false);
        let motor = SimulatedMotor::new(0, 2000);
        motor.state().lock().unwrap().fail_reads = true;

        let mut handles = Handles {
            motor: Some(Box::new(motor)),
            ..Handles::default()
        };
        let err = home_motor(&mut handles, 0, &interrupt).unwrap_err();
        assert!(matches!(err, InitError::Motor(_)));
    }
}
