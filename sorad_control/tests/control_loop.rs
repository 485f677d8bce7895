//! End-to-end scenarios for the orchestration core, driven with simulated
//! devices and simulated time through `CycleRunner::cycle_once`.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sorad_common::config::Config;
use sorad_common::error::CycleError;
use sorad_common::types::GpsFix;
use sorad_control::cycle::CycleRunner;
use sorad_control::db::Db;
use sorad_control::lifecycle::{self, Handles};
use sorad_control::solar::{SolarEstimator, SolarPosition};
use sorad_hal::gps::GpsMonitor;
use sorad_hal::radiometer::{RadiometerChannel, RadiometerManager};
use sorad_hal::sim::{MotorSimState, SimMode, SimulatedFixSource, SimulatedMotor, SimulatedRadiometer};

/// Deterministic sun for scenario tests.
struct FixedSun {
    azimuth_deg: f64,
    elevation_deg: f64,
}

impl SolarEstimator for FixedSun {
    fn solar_position(&self, _lat: f64, _lon: f64, _alt: f64, _t: DateTime<Utc>) -> SolarPosition {
        SolarPosition {
            azimuth_deg: self.azimuth_deg,
            elevation_deg: self.elevation_deg,
        }
    }
}

fn test_config(db_path: Option<std::path::PathBuf>) -> Config {
    let mut toml_text = String::from(
        r#"
[default]
use_fixed_bearing = true
fixed_bearing_deg = 90

[motor]
port_hint = "Motor"
home_pos = 0
step_tolerance = 150
step_threshold = 250
steps_per_degree = 100.0
move_timeout_s = 5.0

[gps]
port_hint = "u-blox"
fix_max_age_s = 10.0
min_satellites = 4

[radiometers]
channels = ["SAM_1", "SAM_2"]
sample_timeout_s = 2.0

[sampling]
min_sun_elevation_deg = 5.0
max_sun_elevation_deg = 85.0
min_commit_interval_s = 60.0
cycle_period_s = 5.0

[gpio]
output_pins = []
"#,
    );
    if let Some(path) = db_path {
        toml_text.push_str(&format!(
            "\n[database]\nused = true\npath = {:?}\n",
            path.to_str().unwrap()
        ));
    }
    let config: Config = toml::from_str(&toml_text).unwrap();
    config.validate().unwrap();
    config
}

fn fix(lat: f64, timestamp: DateTime<Utc>) -> GpsFix {
    GpsFix {
        lat,
        lon: -4.16,
        alt: 10.0,
        speed: 2.0,
        satellites: 9,
        timestamp,
    }
}

/// Start two monitors and block until both have published.
fn fresh_monitors() -> Vec<GpsMonitor> {
    monitors_with_timestamp(None)
}

fn stale_monitors(age: ChronoDuration) -> Vec<GpsMonitor> {
    monitors_with_timestamp(Some(Utc::now() - age))
}

fn monitors_with_timestamp(stamp: Option<DateTime<Utc>>) -> Vec<GpsMonitor> {
    let monitors: Vec<GpsMonitor> = (0..2)
        .map(|i| {
            let label = format!("gps{}", i + 1);
            let base = fix(50.365 + 0.00009 * i as f64, stamp.unwrap_or_else(Utc::now));
            let source = match stamp {
                Some(_) => SimulatedFixSource::steady(&label, base),
                None => SimulatedFixSource::live(&label, base),
            };
            GpsMonitor::start(Box::new(source), Duration::from_millis(5)).unwrap()
        })
        .collect();

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while monitors.iter().any(|m| m.fix().is_none()) && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    monitors
}

fn rad_manager(modes: &[SimMode]) -> RadiometerManager {
    let channels: Vec<Box<dyn RadiometerChannel>> = modes
        .iter()
        .enumerate()
        .map(|(i, mode)| {
            Box::new(SimulatedRadiometer::new(&format!("SAM_{}", i + 1), *mode))
                as Box<dyn RadiometerChannel>
        })
        .collect();
    RadiometerManager::start(channels, Duration::from_millis(400)).unwrap()
}

struct Scenario {
    runner: CycleRunner,
    motor_state: Arc<Mutex<MotorSimState>>,
}

fn scenario(
    config: Config,
    motor_position: i32,
    gps: Vec<GpsMonitor>,
    rad_modes: &[SimMode],
    sun: FixedSun,
) -> Scenario {
    let motor = SimulatedMotor::new(motor_position, 10_000);
    let motor_state = motor.state();
    let db = if config.database.used {
        Some(Db::open(&config.database).unwrap())
    } else {
        None
    };

    let handles = Handles {
        pins: Some(sorad_hal::pins::PinBank::open(&config.gpio).unwrap()),
        motor: Some(Box::new(motor)),
        gps,
        bearing: None, // fixed bearing in config
        rads: Some(rad_manager(rad_modes)),
        db,
    };

    let interrupt = Arc::new(AtomicBool::new(false));
    let runner = CycleRunner::new(config, handles, interrupt, 3)
        .with_solar_estimator(Box::new(sun));
    Scenario { runner, motor_state }
}

fn record_count(runner: &mut CycleRunner) -> i64 {
    runner
        .handles_mut()
        .db
        .as_ref()
        .expect("db configured")
        .record_count()
        .unwrap()
}

// ─── Scenario A: full trigger ───────────────────────────────────────

#[test]
fn full_trigger_persists_one_record_with_spectra() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(Some(dir.path().join("a.db")));

    // Sun az 180, bearing 90, offset 135 -> target -4500 steps. The stage
    // already sits there, so no adjustment happens.
    let mut s = scenario(
        config,
        -4500,
        fresh_monitors(),
        &[SimMode::Normal, SimMode::Normal],
        FixedSun {
            azimuth_deg: 180.0,
            elevation_deg: 40.0,
        },
    );

    let message = s.runner.cycle_once(Utc::now()).unwrap();
    assert!(message.contains("GPS: 1, Rad: 1, Motor: 1, Sun: 1"), "{message}");
    assert!(message.contains("Trig:"), "{message}");
    assert!(message.contains("(2 channels)"), "{message}");
    assert_eq!(record_count(&mut s.runner), 1);
    // No tracking move was needed.
    assert!(s.motor_state.lock().unwrap().rotate_commands.is_empty());

    lifecycle::stop_all(s.runner.handles_mut());
}

// ─── Scenario B: gated, within window ───────────────────────────────

#[test]
fn stale_gps_inside_window_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(Some(dir.path().join("b.db")));

    let mut s = scenario(
        config,
        -4500,
        stale_monitors(ChronoDuration::seconds(120)),
        &[SimMode::Normal, SimMode::Normal],
        FixedSun {
            azimuth_deg: 180.0,
            elevation_deg: 40.0,
        },
    );

    let message = s.runner.cycle_once(Utc::now()).unwrap();
    assert!(message.contains("GPS: 0"), "{message}");
    assert!(message.contains("NotReady:"), "{message}");
    assert_eq!(record_count(&mut s.runner), 0);

    lifecycle::stop_all(s.runner.handles_mut());
}

// ─── Scenario C: tracking adjustment ────────────────────────────────

#[test]
fn off_target_platform_is_moved_before_the_gate_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(Some(dir.path().join("c.db")));

    // Stage at home; target is -4500, well past the 250-step threshold.
    let mut s = scenario(
        config,
        0,
        fresh_monitors(),
        &[SimMode::Normal, SimMode::Normal],
        FixedSun {
            azimuth_deg: 180.0,
            elevation_deg: 40.0,
        },
    );

    let message = s.runner.cycle_once(Utc::now()).unwrap();

    // The move was commanded with the freshly computed target...
    let state = s.motor_state.lock().unwrap();
    assert_eq!(state.rotate_commands, vec![-4500]);
    assert_eq!(state.position, -4500);
    drop(state);

    // ...and the same cycle still triggered a full measurement.
    assert!(message.contains("Sun: 1"), "{message}");
    assert!(message.contains("Trig:"), "{message}");
    assert_eq!(record_count(&mut s.runner), 1);

    lifecycle::stop_all(s.runner.handles_mut());
}

// ─── Scenario D: fault during sampling ──────────────────────────────

#[test]
fn dead_channel_mid_sampling_tears_down_with_pins_off() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(Some(dir.path().join("d.db")));

    let mut s = scenario(
        config,
        -4500,
        fresh_monitors(),
        &[SimMode::Normal, SimMode::Dead],
        FixedSun {
            azimuth_deg: 180.0,
            elevation_deg: 40.0,
        },
    );

    let err = s.runner.cycle_once(Utc::now()).unwrap_err();
    assert!(matches!(err, CycleError::Sampling(_)));

    // No partial record was persisted.
    assert_eq!(record_count(&mut s.runner), 0);

    // The teardown path leaves pins OFF and all threads joined.
    lifecycle::stop_all(s.runner.handles_mut());
    let handles = s.runner.handles_mut();
    let pins = handles.pins.as_ref().unwrap();
    assert!(pins.is_off());
    assert!(pins.is_released());
    for monitor in &mut handles.gps {
        assert!(monitor.worker_mut().is_finished());
    }
    if let Some(rads) = handles.rads.as_mut() {
        for worker in rads.workers_mut() {
            assert!(worker.is_finished());
        }
    }
}

// ─── Heartbeat rate limiting over simulated hours ───────────────────

#[test]
fn closed_gate_emits_one_heartbeat_per_minute() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(Some(dir.path().join("rate.db")));

    let mut s = scenario(
        config,
        -4500,
        stale_monitors(ChronoDuration::hours(2)),
        &[SimMode::Normal, SimMode::Normal],
        FixedSun {
            azimuth_deg: 180.0,
            elevation_deg: 40.0,
        },
    );

    // Ten simulated minutes at the 5 s cadence, gate closed throughout.
    let t0 = Utc::now();
    for step in 1..=120 {
        let now = t0 + ChronoDuration::seconds(5 * step);
        s.runner.cycle_once(now).unwrap();
    }

    // One heartbeat per rolling 60 s window.
    assert_eq!(record_count(&mut s.runner), 10);

    lifecycle::stop_all(s.runner.handles_mut());
}

// ─── stop_all idempotence at the scenario level ─────────────────────

#[test]
fn teardown_runs_twice_without_incident() {
    let config = test_config(None);
    let mut s = scenario(
        config,
        -4500,
        fresh_monitors(),
        &[SimMode::Normal],
        FixedSun {
            azimuth_deg: 180.0,
            elevation_deg: 40.0,
        },
    );

    lifecycle::stop_all(s.runner.handles_mut());
    lifecycle::stop_all(s.runner.handles_mut());

    let pins = s.runner.handles_mut().pins.as_ref().unwrap();
    assert!(pins.is_off());
    assert!(pins.is_released());
}
