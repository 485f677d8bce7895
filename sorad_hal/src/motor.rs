//! Rotation stage controller.
//!
//! The orchestrator only ever sees the [`MotorController`] trait: one
//! command to start a rotation, two queries (position, moving-flag). All
//! poll/timeout/tolerance logic lives in the control crate; this layer is a
//! thin wire protocol.
//!
//! The stage controller speaks a line protocol over RS-485:
//!
//! | Request        | Reply        |
//! |----------------|--------------|
//! | `?P\r`         | `P=<steps>\r` |
//! | `?M\r`         | `M=0\r` / `M=1\r` |
//! | `G<steps>\r`   | `OK\r`       |

use std::io::{Read, Write};
use std::time::Duration;

use sorad_common::error::DeviceError;
use tracing::debug;

/// Position + device moving-flag read in one query pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionReading {
    /// The device's own in-motion flag. The caller combines this with its
    /// tolerance band; a stalled-but-off-target stage reads `false` here.
    pub moving: bool,
    /// Step position at query time.
    pub position: i32,
}

/// Low-level rotation stage interface consumed by the control loop.
pub trait MotorController: Send {
    /// Current step position.
    fn get_position(&mut self) -> Result<i32, DeviceError>;

    /// Start rotating toward the target step. Returns once the command is
    /// accepted; the move itself completes asynchronously.
    fn rotate_to(&mut self, target: i32) -> Result<(), DeviceError>;

    /// Query position and the device moving-flag in one round trip. The
    /// target/tolerance band is passed down for devices that implement
    /// their own stop detection; the control loop applies it regardless.
    fn is_moving(&mut self, target: i32, tolerance: i32) -> Result<MotionReading, DeviceError>;
}

/// Serial implementation of [`MotorController`].
pub struct SerialMotor {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialMotor {
    /// Serial read timeout for one reply line.
    const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

    /// Open the stage controller on the given port.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, DeviceError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Self::REPLY_TIMEOUT)
            .open()
            .map_err(|e| DeviceError::Io(format!("open {port_name}: {e}")))?;
        Ok(Self { port })
    }

    /// Send one command and read one `\r`-terminated reply line.
    fn transact(&mut self, command: &str) -> Result<String, DeviceError> {
        self.port
            .write_all(command.as_bytes())
            .map_err(|e| DeviceError::Io(e.to_string()))?;

        let mut line = Vec::with_capacity(16);
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    if byte[0] == b'\r' {
                        break;
                    }
                    line.push(byte[0]);
                    if line.len() > 64 {
                        return Err(DeviceError::Protocol("reply line too long".to_string()));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(DeviceError::Timeout(format!("no reply to {command:?}")));
                }
                Err(e) => return Err(DeviceError::Io(e.to_string())),
            }
        }
        Ok(String::from_utf8_lossy(&line).trim().to_string())
    }
}

impl MotorController for SerialMotor {
    fn get_position(&mut self) -> Result<i32, DeviceError> {
        let reply = self.transact("?P\r")?;
        parse_tagged_int(&reply, "P=")
    }

    fn rotate_to(&mut self, target: i32) -> Result<(), DeviceError> {
        let reply = self.transact(&format!("G{target}\r"))?;
        if reply == "OK" {
            Ok(())
        } else {
            Err(DeviceError::Protocol(format!(
                "rotate command rejected: {reply:?}"
            )))
        }
    }

    fn is_moving(&mut self, target: i32, _tolerance: i32) -> Result<MotionReading, DeviceError> {
        let flag_reply = self.transact("?M\r")?;
        let moving = parse_tagged_int(&flag_reply, "M=")? != 0;
        let position = self.get_position()?;
        debug!("Motor flag={moving} pos={position} target={target}");
        Ok(MotionReading { moving, position })
    }
}

/// Parse `<tag><int>` replies such as `P=1200`.
fn parse_tagged_int(reply: &str, tag: &str) -> Result<i32, DeviceError> {
    reply
        .strip_prefix(tag)
        .and_then(|v| v.trim().parse::<i32>().ok())
        .ok_or_else(|| DeviceError::Protocol(format!("unexpected reply {reply:?} (want {tag}N)")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_position_reply() {
        assert_eq!(parse_tagged_int("P=1200", "P=").unwrap(), 1200);
        assert_eq!(parse_tagged_int("P=-44", "P=").unwrap(), -44);
    }

    #[test]
    fn parses_moving_flag_reply() {
        assert_eq!(parse_tagged_int("M=1", "M=").unwrap(), 1);
        assert_eq!(parse_tagged_int("M=0", "M=").unwrap(), 0);
    }

    #[test]
    fn garbage_reply_is_a_protocol_error() {
        assert!(matches!(
            parse_tagged_int("ERR 3", "P="),
            Err(DeviceError::Protocol(_))
        ));
        assert!(matches!(
            parse_tagged_int("P=abc", "P="),
            Err(DeviceError::Protocol(_))
        ));
    }
}
