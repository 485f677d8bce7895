//! Sun position and motor-angle geometry.
//!
//! Two halves: a [`SolarEstimator`] that turns position + time into solar
//! azimuth/elevation, and the pure trigonometry that turns solar azimuth +
//! vessel bearing into a platform rotation target.
//!
//! The built-in estimator is the classic low-precision ecliptic
//! approximation (good to a few hundredths of a degree over this decade) —
//! far inside the pointing tolerance of a rotation stage on a moving ship.
//! Anything fancier plugs in behind the trait.
//!
//! The viewing geometry: the radiometers must look at the water at a fixed
//! azimuth offset from the sun (135° by default, away from sun glint).
//! Offsetting either side of the sun gives two candidate viewing azimuths;
//! each maps to one platform angle relative to the bow. The target is the
//! candidate needing the smaller rotation from home.

use chrono::{DateTime, Utc};
use sorad_common::config::MotorConfig;

/// Solar azimuth/elevation at one place and instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    /// Degrees clockwise from true north, [0, 360).
    pub azimuth_deg: f64,
    /// Degrees above the horizon; negative below.
    pub elevation_deg: f64,
}

/// Computes where the sun is.
pub trait SolarEstimator: Send {
    fn solar_position(&self, lat: f64, lon: f64, alt_m: f64, time: DateTime<Utc>) -> SolarPosition;
}

/// Low-precision ecliptic-coordinate sun position.
#[derive(Debug, Default)]
pub struct LowPrecisionSun;

impl SolarEstimator for LowPrecisionSun {
    fn solar_position(
        &self,
        lat: f64,
        lon: f64,
        _alt_m: f64,
        time: DateTime<Utc>,
    ) -> SolarPosition {
        // Days (with fraction) since J2000.0.
        let n = (time.timestamp() as f64 + time.timestamp_subsec_micros() as f64 * 1e-6
            - 946_728_000.0)
            / 86_400.0;

        // Ecliptic coordinates of the sun.
        let mean_longitude = wrap_360(280.460 + 0.985_647_4 * n);
        let mean_anomaly = wrap_360(357.528 + 0.985_600_3 * n).to_radians();
        let ecliptic_longitude = (mean_longitude
            + 1.915 * mean_anomaly.sin()
            + 0.020 * (2.0 * mean_anomaly).sin())
        .to_radians();
        let obliquity = (23.439 - 0.000_000_4 * n).to_radians();

        // Equatorial coordinates.
        let right_ascension = (obliquity.cos() * ecliptic_longitude.sin())
            .atan2(ecliptic_longitude.cos())
            .to_degrees();
        let declination = (obliquity.sin() * ecliptic_longitude.sin()).asin();

        // Local hour angle.
        let gmst_deg = wrap_360(280.460_618_37 + 360.985_647_366_29 * n);
        let hour_angle =
            wrap_180(gmst_deg + lon - wrap_360(right_ascension)).to_radians();

        // Horizontal coordinates.
        let phi = lat.to_radians();
        let sin_elevation = phi.sin() * declination.sin()
            + phi.cos() * declination.cos() * hour_angle.cos();
        let elevation = sin_elevation.clamp(-1.0, 1.0).asin();

        let cos_azimuth = (declination.sin() - elevation.sin() * phi.sin())
            / (elevation.cos() * phi.cos());
        let mut azimuth_deg = cos_azimuth.clamp(-1.0, 1.0).acos().to_degrees();
        if hour_angle.sin() > 0.0 {
            azimuth_deg = 360.0 - azimuth_deg;
        }

        SolarPosition {
            azimuth_deg: wrap_360(azimuth_deg),
            elevation_deg: elevation.to_degrees(),
        }
    }
}

// ─── Motor-angle geometry ───────────────────────────────────────────

/// The two candidate viewing geometries and the chosen rotation target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorAngles {
    /// Viewing azimuth counter-clockwise of the sun [deg true].
    pub view_azimuth_ccw_deg: f64,
    /// Viewing azimuth clockwise of the sun [deg true].
    pub view_azimuth_cw_deg: f64,
    /// Platform angle for the CCW candidate, relative to the bow [-180, 180).
    pub achievable_ccw_deg: f64,
    /// Platform angle for the CW candidate, relative to the bow [-180, 180).
    pub achievable_cw_deg: f64,
    /// Chosen platform angle relative to the bow.
    pub target_deg: f64,
    /// Absolute viewing azimuth of the chosen candidate [deg true].
    pub target_view_azimuth_deg: f64,
    /// Chosen target as a step position.
    pub target_step: i32,
}

/// Map solar azimuth + vessel bearing onto a platform rotation target.
pub fn compute_motor_angles(
    solar_azimuth_deg: f64,
    bearing_deg: f64,
    motor: &MotorConfig,
    view_offset_deg: f64,
) -> MotorAngles {
    let view_ccw = wrap_360(solar_azimuth_deg - view_offset_deg);
    let view_cw = wrap_360(solar_azimuth_deg + view_offset_deg);

    let achievable_ccw = wrap_180(view_ccw - bearing_deg);
    let achievable_cw = wrap_180(view_cw - bearing_deg);

    // Smallest rotation from home wins.
    let (target_deg, target_view) = if achievable_ccw.abs() <= achievable_cw.abs() {
        (achievable_ccw, view_ccw)
    } else {
        (achievable_cw, view_cw)
    };

    let target_step = motor.home_pos + (target_deg * motor.steps_per_degree).round() as i32;

    MotorAngles {
        view_azimuth_ccw_deg: view_ccw,
        view_azimuth_cw_deg: view_cw,
        achievable_ccw_deg: achievable_ccw,
        achievable_cw_deg: achievable_cw,
        target_deg,
        target_view_azimuth_deg: target_view,
        target_step,
    }
}

/// Wrap to [0, 360).
#[inline]
pub fn wrap_360(deg: f64) -> f64 {
    deg.rem_euclid(360.0)
}

/// Wrap to [-180, 180).
#[inline]
pub fn wrap_180(deg: f64) -> f64 {
    wrap_360(deg + 180.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn motor_config() -> MotorConfig {
        MotorConfig {
            port_hint: "Motor".to_string(),
            baud_rate: 9600,
            home_pos: 0,
            step_tolerance: 150,
            step_threshold: 250,
            steps_per_degree: 100.0,
            move_timeout_s: 10.0,
        }
    }

    #[test]
    fn wrap_helpers() {
        assert_eq!(wrap_360(370.0), 10.0);
        assert_eq!(wrap_360(-10.0), 350.0);
        assert_eq!(wrap_180(190.0), -170.0);
        assert_eq!(wrap_180(-190.0), 170.0);
        assert_eq!(wrap_180(45.0), 45.0);
    }

    #[test]
    fn midsummer_noon_in_plymouth() {
        // Lat 50.33N, lon 4.16W, 2026-06-21 12:17 UTC (solar noon at 4°W).
        let time = Utc.with_ymd_and_hms(2026, 6, 21, 12, 17, 0).unwrap();
        let pos = LowPrecisionSun.solar_position(50.33, -4.16, 0.0, time);
        // el ~= 90 - lat + declination = 90 - 50.33 + 23.44 = 63.1
        assert!((pos.elevation_deg - 63.1).abs() < 1.0, "el {}", pos.elevation_deg);
        assert!((pos.azimuth_deg - 180.0).abs() < 3.0, "az {}", pos.azimuth_deg);
    }

    #[test]
    fn sun_is_below_horizon_at_midnight() {
        let time = Utc.with_ymd_and_hms(2026, 6, 21, 0, 0, 0).unwrap();
        let pos = LowPrecisionSun.solar_position(50.33, -4.16, 0.0, time);
        assert!(pos.elevation_deg < 0.0, "el {}", pos.elevation_deg);
    }

    #[test]
    fn morning_sun_is_in_the_east() {
        let time = Utc.with_ymd_and_hms(2026, 6, 21, 6, 0, 0).unwrap();
        let pos = LowPrecisionSun.solar_position(50.33, -4.16, 0.0, time);
        assert!(
            pos.azimuth_deg > 50.0 && pos.azimuth_deg < 130.0,
            "az {}",
            pos.azimuth_deg
        );
    }

    #[test]
    fn picks_the_smaller_rotation() {
        // Sun dead astern of a ship heading east: CCW candidate needs -45°,
        // CW needs -135°.
        let angles = compute_motor_angles(180.0, 90.0, &motor_config(), 135.0);
        assert_eq!(angles.view_azimuth_ccw_deg, 45.0);
        assert_eq!(angles.view_azimuth_cw_deg, 315.0);
        assert_eq!(angles.achievable_ccw_deg, -45.0);
        assert_eq!(angles.achievable_cw_deg, -135.0);
        assert_eq!(angles.target_deg, -45.0);
        assert_eq!(angles.target_view_azimuth_deg, 45.0);
        assert_eq!(angles.target_step, -4500);
    }

    #[test]
    fn target_step_respects_home_offset() {
        let mut motor = motor_config();
        motor.home_pos = 10_000;
        let angles = compute_motor_angles(180.0, 90.0, &motor, 135.0);
        assert_eq!(angles.target_step, 10_000 - 4500);
    }

    #[test]
    fn candidates_wrap_at_north() {
        let angles = compute_motor_angles(10.0, 350.0, &motor_config(), 135.0);
        assert_eq!(angles.view_azimuth_ccw_deg, 235.0);
        assert_eq!(angles.view_azimuth_cw_deg, 145.0);
        // 235 - 350 = -115, 145 - 350 = -205 -> wraps to 155.
        assert_eq!(angles.achievable_ccw_deg, -115.0);
        assert_eq!(angles.achievable_cw_deg, 155.0);
        assert_eq!(angles.target_deg, -115.0);
    }
}
