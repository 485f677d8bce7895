//! So-Rad Device Layer
//!
//! Everything that touches hardware or runs a background thread lives here,
//! behind traits the orchestrator consumes:
//!
//! - [`ports`] - Serial port enumeration and config-hint matching
//! - [`pins`] - Digital output bank that is forced OFF at startup and on
//!   every shutdown path
//! - [`worker`] - Uniform named-thread handle with a cooperative stop flag
//! - [`motor`] - Rotation stage controller (trait + serial implementation)
//! - [`gps`] - Per-receiver fix monitor threads
//! - [`bearing`] - Dual-antenna heading estimator thread
//! - [`radiometer`] - Synchronized multi-channel sampling manager
//! - [`sim`] - Software device implementations for development and testing
//!
//! Real device protocols are deliberately thin; anything with physics or
//! wire-format complexity (NMEA decoding, sensor internals) sits behind a
//! trait so a better backend can be dropped in without touching the
//! orchestrator.

pub mod bearing;
pub mod gps;
pub mod motor;
pub mod pins;
pub mod ports;
pub mod radiometer;
pub mod sim;
pub mod worker;
