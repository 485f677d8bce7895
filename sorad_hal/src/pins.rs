//! Digital output bank.
//!
//! The platform drives relays (radiometer power, motor enable) through GPIO
//! outputs. The one hard rule: every configured output is forced OFF at
//! startup and again on every shutdown path, no matter how the process is
//! going down. `all_off` and `release` are both idempotent so teardown can
//! run twice without consequence.
//!
//! On Linux the bank drives a character-device GPIO chip via `gpiod`;
//! elsewhere (and whenever no pins are configured) it is a no-op that still
//! tracks the OFF/released state for the orchestrator and tests.

use sorad_common::config::GpioConfig;
use sorad_common::error::DeviceError;
use tracing::{info, warn};

/// Handle on the configured output lines.
pub struct PinBank {
    backend: Backend,
    off: bool,
    released: bool,
}

enum Backend {
    #[cfg(target_os = "linux")]
    Gpiod {
        lines: gpiod::Lines<gpiod::Output>,
    },
    Noop,
}

impl PinBank {
    /// Claim the configured output lines, driving them OFF immediately.
    ///
    /// With an empty pin list the bank is a no-op. On non-Linux hosts the
    /// bank is always a no-op (there is no GPIO character device to drive).
    pub fn open(config: &GpioConfig) -> Result<Self, DeviceError> {
        if config.output_pins.is_empty() {
            info!("No output pins configured; pin bank is inactive");
            return Ok(Self {
                backend: Backend::Noop,
                off: true,
                released: false,
            });
        }

        #[cfg(target_os = "linux")]
        {
            let chip = gpiod::Chip::new(&config.chip)
                .map_err(|e| DeviceError::Io(format!("open {}: {e}", config.chip)))?;
            let opts = gpiod::Options::output(&config.output_pins)
                .values(0u64)
                .consumer("sorad");
            let lines = chip
                .request_lines(opts)
                .map_err(|e| DeviceError::Io(format!("request output lines: {e}")))?;
            info!(
                "Claimed {} output lines on {}, all driven OFF",
                config.output_pins.len(),
                config.chip
            );
            Ok(Self {
                backend: Backend::Gpiod { lines },
                off: true,
                released: false,
            })
        }

        #[cfg(not(target_os = "linux"))]
        {
            warn!("GPIO unavailable on this platform; pin bank is a no-op");
            Ok(Self {
                backend: Backend::Noop,
                off: true,
                released: false,
            })
        }
    }

    /// Drive every claimed line OFF. Idempotent; a released bank stays
    /// released (the lines were already driven OFF on release).
    pub fn all_off(&mut self) -> Result<(), DeviceError> {
        match &mut self.backend {
            #[cfg(target_os = "linux")]
            Backend::Gpiod { lines } => {
                lines
                    .set_values(0u64)
                    .map_err(|e| DeviceError::Io(format!("set lines low: {e}")))?;
            }
            Backend::Noop => {}
        }
        self.off = true;
        Ok(())
    }

    /// Drive every line OFF and give the lines back to the kernel.
    /// Idempotent, never fails; an OFF write that errors is logged and the
    /// release still happens.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.all_off() {
            warn!("Pin OFF write during release failed: {e}");
        }
        self.backend = Backend::Noop;
        self.released = true;
    }

    /// Whether the last state driven onto the lines was OFF.
    #[inline]
    pub fn is_off(&self) -> bool {
        self.off
    }

    /// Whether the lines have been given back.
    #[inline]
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl std::fmt::Debug for PinBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinBank")
            .field("off", &self.off)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inactive_bank() -> PinBank {
        PinBank::open(&GpioConfig {
            chip: "/dev/gpiochip0".to_string(),
            output_pins: vec![],
        })
        .unwrap()
    }

    #[test]
    fn inactive_bank_reports_off() {
        let bank = inactive_bank();
        assert!(bank.is_off());
        assert!(!bank.is_released());
    }

    #[test]
    fn release_is_idempotent_and_leaves_pins_off() {
        let mut bank = inactive_bank();
        bank.release();
        bank.release();
        assert!(bank.is_off());
        assert!(bank.is_released());
    }

    #[test]
    fn all_off_after_release_still_reports_off() {
        let mut bank = inactive_bank();
        bank.release();
        bank.all_off().unwrap();
        assert!(bank.is_off());
    }
}
