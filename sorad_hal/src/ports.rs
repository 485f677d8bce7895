//! Serial port enumeration and config matching.
//!
//! Device sections in the config name a `port_hint`; at startup the hint is
//! matched (case-insensitively) against the discovered port names and USB
//! descriptions. The motor takes the first match, GPS receivers take every
//! match — one monitor thread each.

use serialport::SerialPortType;
use sorad_common::error::DeviceError;

/// One discovered serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPort {
    /// OS device path, e.g. `/dev/ttyUSB0`.
    pub name: String,
    /// Human-readable description (USB product string where available).
    pub description: String,
}

impl DiscoveredPort {
    /// Case-insensitive substring match against name and description.
    pub fn matches(&self, hint: &str) -> bool {
        let hint = hint.to_ascii_lowercase();
        self.name.to_ascii_lowercase().contains(&hint)
            || self.description.to_ascii_lowercase().contains(&hint)
    }
}

/// Enumerate the serial ports currently present on the system.
pub fn discover() -> Result<Vec<DiscoveredPort>, DeviceError> {
    let ports = serialport::available_ports().map_err(|e| DeviceError::Io(e.to_string()))?;
    Ok(ports
        .into_iter()
        .map(|p| DiscoveredPort {
            description: describe(&p.port_type),
            name: p.port_name,
        })
        .collect())
}

fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(info) => {
            let product = info.product.clone().unwrap_or_default();
            let manufacturer = info.manufacturer.clone().unwrap_or_default();
            format!("{manufacturer} {product}").trim().to_string()
        }
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => String::new(),
    }
}

/// First port matching the hint.
pub fn match_one<'a>(ports: &'a [DiscoveredPort], hint: &str) -> Option<&'a DiscoveredPort> {
    ports.iter().find(|p| p.matches(hint))
}

/// Every port matching the hint, in discovery order.
pub fn match_all<'a>(ports: &'a [DiscoveredPort], hint: &str) -> Vec<&'a DiscoveredPort> {
    ports.iter().filter(|p| p.matches(hint)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Vec<DiscoveredPort> {
        vec![
            DiscoveredPort {
                name: "/dev/ttyUSB0".to_string(),
                description: "FTDI USB-Motor Adapter".to_string(),
            },
            DiscoveredPort {
                name: "/dev/ttyACM0".to_string(),
                description: "u-blox GNSS receiver".to_string(),
            },
            DiscoveredPort {
                name: "/dev/ttyACM1".to_string(),
                description: "u-blox GNSS receiver".to_string(),
            },
        ]
    }

    #[test]
    fn hint_matches_description_case_insensitively() {
        let ports = fixture();
        let motor = match_one(&ports, "usb-motor").unwrap();
        assert_eq!(motor.name, "/dev/ttyUSB0");
    }

    #[test]
    fn hint_matches_device_path() {
        let ports = fixture();
        assert!(match_one(&ports, "ttyACM1").is_some());
    }

    #[test]
    fn match_all_finds_both_receivers() {
        let ports = fixture();
        let gps = match_all(&ports, "u-blox");
        assert_eq!(gps.len(), 2);
        assert_eq!(gps[0].name, "/dev/ttyACM0");
    }

    #[test]
    fn no_match_is_empty() {
        let ports = fixture();
        assert!(match_one(&ports, "radiometer").is_none());
        assert!(match_all(&ports, "radiometer").is_empty());
    }
}
