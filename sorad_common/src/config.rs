//! TOML configuration for the So-Rad platform.
//!
//! One file configures the whole system. Sections map 1:1 onto the structs
//! below; every field that has a sensible default is optional in the file.
//!
//! # TOML Example
//!
//! ```toml
//! [default]
//! use_fixed_bearing = false
//! fixed_bearing_deg = 0
//!
//! [motor]
//! port_hint = "USB-Motor"
//! baud_rate = 9600
//! home_pos = 0
//! step_tolerance = 150
//! step_threshold = 250
//! steps_per_degree = 100.0
//! move_timeout_s = 10.0
//!
//! [gps]
//! port_hint = "u-blox"
//! baud_rate = 115200
//! fix_max_age_s = 10.0
//! min_satellites = 4
//!
//! [radiometers]
//! channels = ["SAM_8166", "SAM_8167", "SAM_8168"]
//! sample_timeout_s = 30.0
//!
//! [sampling]
//! min_sun_elevation_deg = 5.0
//! max_sun_elevation_deg = 85.0
//! min_commit_interval_s = 60.0
//! cycle_period_s = 5.0
//!
//! [gpio]
//! chip = "/dev/gpiochip0"
//! output_pins = [11, 12, 13, 15]
//!
//! [database]
//! used = true
//! path = "sorad.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration for the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultSection,
    pub motor: MotorConfig,
    pub gps: GpsConfig,
    pub radiometers: RadiometerConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    pub gpio: GpioConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// - `ConfigError::FileNotFound` if the file does not exist
    /// - `ConfigError::ParseError` on invalid TOML
    /// - `ConfigError::ValidationError` on semantic problems
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.min_sun_elevation_deg >= self.sampling.max_sun_elevation_deg {
            return Err(ConfigError::ValidationError(format!(
                "sun elevation band is empty ({} >= {})",
                self.sampling.min_sun_elevation_deg, self.sampling.max_sun_elevation_deg
            )));
        }
        if self.sampling.cycle_period_s <= 0.0 {
            return Err(ConfigError::ValidationError(
                "cycle_period_s must be positive".to_string(),
            ));
        }
        if self.motor.steps_per_degree <= 0.0 {
            return Err(ConfigError::ValidationError(
                "steps_per_degree must be positive".to_string(),
            ));
        }
        if self.motor.step_tolerance < 0 || self.motor.step_threshold < 0 {
            return Err(ConfigError::ValidationError(
                "motor step tolerance and threshold must be non-negative".to_string(),
            ));
        }
        if self.radiometers.channels.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one radiometer channel must be configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[default]` — vessel-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultSection {
    /// Use a fixed heading instead of the dual-GPS bearing estimate.
    #[serde(default)]
    pub use_fixed_bearing: bool,
    /// The fixed heading [deg], read only when `use_fixed_bearing` is set.
    #[serde(default)]
    pub fixed_bearing_deg: i32,
}

/// `[motor]` — rotating platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorConfig {
    /// Substring matched against discovered serial port descriptions.
    pub port_hint: String,
    #[serde(default = "default_motor_baud")]
    pub baud_rate: u32,
    /// Reference (home) position [steps].
    #[serde(default)]
    pub home_pos: i32,
    /// Acceptance band for tracking moves [steps].
    #[serde(default = "default_step_tolerance")]
    pub step_tolerance: i32,
    /// Hysteresis: a tracking move is only issued when the target deviates
    /// from the current position by more than this [steps].
    #[serde(default = "default_step_threshold")]
    pub step_threshold: i32,
    /// Step scaling of the rotation stage.
    #[serde(default = "default_steps_per_degree")]
    pub steps_per_degree: f64,
    /// Wall-clock bound on one tracking move [s].
    #[serde(default = "default_move_timeout")]
    pub move_timeout_s: f64,
}

impl MotorConfig {
    /// `move_timeout_s` as a `Duration`.
    #[inline]
    pub fn move_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.move_timeout_s)
    }
}

/// `[gps]` — the two position sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsConfig {
    /// Substring matched against discovered serial port descriptions.
    /// Every matching port gets its own monitor thread.
    pub port_hint: String,
    #[serde(default = "default_gps_baud")]
    pub baud_rate: u32,
    /// A fix older than this does not count as ready [s].
    #[serde(default = "default_fix_max_age")]
    pub fix_max_age_s: f64,
    /// Minimum satellites for a fix to count as ready.
    #[serde(default = "default_min_satellites")]
    pub min_satellites: u32,
}

impl GpsConfig {
    /// `fix_max_age_s` as a `Duration`.
    #[inline]
    pub fn fix_max_age(&self) -> Duration {
        Duration::from_secs_f64(self.fix_max_age_s)
    }
}

/// `[radiometers]` — the synchronized sensor set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadiometerConfig {
    /// Channel identifiers, one per physical sensor.
    pub channels: Vec<String>,
    /// Bound on one synchronized sampling call [s].
    #[serde(default = "default_sample_timeout")]
    pub sample_timeout_s: f64,
}

impl RadiometerConfig {
    /// `sample_timeout_s` as a `Duration`.
    #[inline]
    pub fn sample_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.sample_timeout_s)
    }
}

/// `[sampling]` — when measurements are allowed and how often anything
/// is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_min_elevation")]
    pub min_sun_elevation_deg: f64,
    #[serde(default = "default_max_elevation")]
    pub max_sun_elevation_deg: f64,
    /// Heartbeat interval: with the gate closed, at most one metadata-only
    /// record is written per this many seconds.
    #[serde(default = "default_commit_interval")]
    pub min_commit_interval_s: f64,
    /// Target period of the main cycle [s].
    #[serde(default = "default_cycle_period")]
    pub cycle_period_s: f64,
    /// Viewing azimuth offset from the sun [deg]; 135 avoids sun glint.
    #[serde(default = "default_view_offset")]
    pub view_azimuth_offset_deg: f64,
}

impl SamplingConfig {
    #[inline]
    pub fn min_commit_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_commit_interval_s)
    }

    #[inline]
    pub fn cycle_period(&self) -> Duration {
        Duration::from_secs_f64(self.cycle_period_s)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_sun_elevation_deg: default_min_elevation(),
            max_sun_elevation_deg: default_max_elevation(),
            min_commit_interval_s: default_commit_interval(),
            cycle_period_s: default_cycle_period(),
            view_azimuth_offset_deg: default_view_offset(),
        }
    }
}

/// `[gpio]` — digital outputs that must never be left high.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpioConfig {
    /// Character device of the GPIO chip.
    #[serde(default = "default_gpio_chip")]
    pub chip: String,
    /// Output line offsets to force OFF at startup and shutdown.
    pub output_pins: Vec<u32>,
}

/// `[database]` — measurement persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// When false, nothing is written but commit timing still advances.
    #[serde(default)]
    pub used: bool,
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            used: false,
            path: default_db_path(),
        }
    }
}

fn default_motor_baud() -> u32 {
    9600
}
fn default_gps_baud() -> u32 {
    115200
}
fn default_step_tolerance() -> i32 {
    150
}
fn default_step_threshold() -> i32 {
    250
}
fn default_steps_per_degree() -> f64 {
    100.0
}
fn default_move_timeout() -> f64 {
    10.0
}
fn default_fix_max_age() -> f64 {
    10.0
}
fn default_min_satellites() -> u32 {
    4
}
fn default_sample_timeout() -> f64 {
    30.0
}
fn default_min_elevation() -> f64 {
    5.0
}
fn default_max_elevation() -> f64 {
    85.0
}
fn default_commit_interval() -> f64 {
    60.0
}
fn default_cycle_period() -> f64 {
    5.0
}
fn default_view_offset() -> f64 {
    135.0
}
fn default_gpio_chip() -> String {
    "/dev/gpiochip0".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("sorad.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[motor]
port_hint = "Motor"

[gps]
port_hint = "u-blox"

[radiometers]
channels = ["SAM_1"]

[gpio]
output_pins = [11, 12]
"#;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_loads_with_defaults() {
        let f = write_temp(MINIMAL);
        let config = Config::load(f.path()).unwrap();
        assert_eq!(config.sampling.cycle_period_s, 5.0);
        assert_eq!(config.sampling.min_commit_interval_s, 60.0);
        assert_eq!(config.motor.step_tolerance, 150);
        assert!(!config.database.used);
        assert!(!config.default.use_fixed_bearing);
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let err = Config::load(Path::new("/nonexistent/sorad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound));
    }

    #[test]
    fn empty_elevation_band_is_rejected() {
        let content = format!(
            "{MINIMAL}\n[sampling]\nmin_sun_elevation_deg = 40.0\nmax_sun_elevation_deg = 10.0\n"
        );
        let f = write_temp(&content);
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn no_channels_is_rejected() {
        let content = MINIMAL.replace("channels = [\"SAM_1\"]", "channels = []");
        let f = write_temp(&content);
        let err = Config::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
