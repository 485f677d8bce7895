//! Error taxonomy shared across the workspace.
//!
//! Three layers, matching how failures are handled:
//!
//! - [`DeviceError`] — a single device operation failed. Position and fix
//!   reads absorb these locally (the reading is simply "unknown" this cycle);
//!   only operations that must succeed propagate them.
//! - [`InitError`] — fatal startup failure. Logged, teardown runs, then the
//!   process exits non-zero.
//! - [`CycleError`] — an error escaped one iteration of the main loop. No
//!   per-cycle retry: teardown runs and the process exits non-zero.

use thiserror::Error;

/// Error from one device operation.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// Serial or GPIO I/O failed.
    #[error("device I/O error: {0}")]
    Io(String),

    /// The device answered, but not with anything parseable.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The device did not answer within its deadline.
    #[error("device timed out: {0}")]
    Timeout(String),

    /// The operation was asked of a device that was never discovered.
    #[error("device not available: {0}")]
    NotAvailable(String),
}

/// Fatal startup failure.
///
/// The caller must run teardown on whatever was constructed before
/// propagating this.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("pin subsystem initialization failed: {0}")]
    Pins(String),

    #[error("serial port discovery failed: {0}")]
    PortDiscovery(String),

    #[error("no serial port matches '{hint}' for {device}")]
    DeviceMatch { device: &'static str, hint: String },

    #[error("motor initialization failed: {0}")]
    Motor(String),

    #[error("GPS monitor startup failed: {0}")]
    Gps(String),

    #[error("radiometer manager startup failed: {0}")]
    Radiometer(String),

    #[error("homing did not complete: position {position:?}, home {home}")]
    HomingIncomplete { position: Option<i32>, home: i32 },

    #[error("persistence open failed: {0}")]
    Persistence(String),
}

/// An error that escaped one iteration of the main cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("synchronized sampling failed: {0}")]
    Sampling(String),

    #[error("record commit failed: {0}")]
    Commit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_error_display() {
        let err = DeviceError::Timeout("motor position query".to_string());
        assert!(err.to_string().contains("motor position query"));
    }

    #[test]
    fn init_error_wraps_config_error() {
        let err: InitError = crate::config::ConfigError::FileNotFound.into();
        assert!(err.to_string().contains("not found"));
    }
}
