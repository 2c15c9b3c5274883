use tracing::{debug, info, instrument, trace};

use super::services::{ChannelError, SerialBackend};

/// Environment variable holding an explicit device path. When set it is
/// used verbatim and discovery is skipped.
pub const PORT_ENV_VAR: &str = "ARDUINO_PORT";

/// Substrings that mark a port as an Arduino or common USB-serial bridge.
pub const PREFERRED_KEYWORDS: [&str; 7] = [
    "usbmodem",  // Arduino on macOS
    "usbserial", // FTDI, CP210x
    "ttyacm",    // Linux Arduinos
    "ttyusb",    // Linux USB-serial
    "arduino",
    "slab", // Silicon Labs CP210x
    "wch",  // CH340 clones
];

const DEBUG_CONSOLE_KEYWORD: &str = "debug";

/// A serial device as seen by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub device: String,
    pub description: String,
}

impl PortCandidate {
    pub fn new(device: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            description: description.into(),
        }
    }

    fn contains_keyword(&self, keyword: &str) -> bool {
        self.device.to_lowercase().contains(keyword)
            || self.description.to_lowercase().contains(keyword)
    }

    /// Some development boards expose a debug console that is never the
    /// buzzer controller.
    pub fn is_debug_console(&self) -> bool {
        self.contains_keyword(DEBUG_CONSOLE_KEYWORD)
    }

    pub fn is_preferred(&self) -> bool {
        PREFERRED_KEYWORDS
            .iter()
            .any(|keyword| self.contains_keyword(keyword))
    }
}

/// Pick the controller port out of `candidates`.
/// Debug consoles are never chosen. The first Arduino-like port wins,
/// otherwise the first remaining port.
pub fn select_port(candidates: &[PortCandidate]) -> Option<&PortCandidate> {
    let usable: Vec<&PortCandidate> = candidates
        .iter()
        .filter(|c| {
            if c.is_debug_console() {
                trace!("Skipping debug console '{}'.", c.device);
                false
            } else {
                true
            }
        })
        .collect();

    usable
        .iter()
        .find(|c| c.is_preferred())
        .or(usable.first())
        .copied()
}

/// Resolve the port to connect to. An explicit override always wins,
/// otherwise the backend's port list goes through [`select_port`].
#[instrument(skip_all)]
pub fn discover_port(
    port_override: Option<&str>,
    backend: &dyn SerialBackend,
) -> Result<String, ChannelError> {
    if let Some(port) = port_override.filter(|p| !p.is_empty()) {
        debug!("Using port override '{}'.", port);
        return Ok(port.to_string());
    }

    let candidates = backend.list_ports()?;
    for candidate in candidates.iter() {
        debug!("Available port: {} - {}", candidate.device, candidate.description);
    }

    match select_port(&candidates) {
        Some(candidate) => {
            info!("Chosen port: {}", candidate.device);
            Ok(candidate.device.clone())
        }
        None => Err(ChannelError::DeviceNotFound),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::externals::hardware::services::SerialLink;

    use super::*;

    struct ListingBackend(Vec<PortCandidate>);

    impl SerialBackend for ListingBackend {
        fn list_ports(&self) -> Result<Vec<PortCandidate>, ChannelError> {
            Ok(self.0.clone())
        }

        fn open(
            &self,
            _port: &str,
            _baud_rate: u32,
            _read_timeout: Duration,
        ) -> Result<Box<dyn SerialLink>, ChannelError> {
            unreachable!("Discovery never opens ports")
        }
    }

    struct BrokenBackend;

    impl SerialBackend for BrokenBackend {
        fn list_ports(&self) -> Result<Vec<PortCandidate>, ChannelError> {
            Err(ChannelError::Enumerate(serialport::Error::new(
                serialport::ErrorKind::Unknown,
                "listing not allowed",
            )))
        }

        fn open(
            &self,
            _port: &str,
            _baud_rate: u32,
            _read_timeout: Duration,
        ) -> Result<Box<dyn SerialLink>, ChannelError> {
            unreachable!("Discovery never opens ports")
        }
    }

    #[test]
    fn test_prefers_usb_serial_over_earlier_ports() {
        let candidates = vec![
            PortCandidate::new("/dev/cu.debug-console", "n/a (debug console)"),
            PortCandidate::new("/dev/cu.Bluetooth-Incoming-Port", "n/a"),
            PortCandidate::new("/dev/cu.usbserial-0001", "Silicon Labs CP210x"),
        ];

        let chosen = select_port(&candidates).expect("Expected a port");
        assert_eq!(chosen.device, "/dev/cu.usbserial-0001");
    }

    #[test]
    fn test_keyword_match_is_case_insensitive_on_description() {
        let candidates = vec![
            PortCandidate::new("/dev/ttyS0", "PCI serial port"),
            PortCandidate::new("COM7", "Arduino Uno (COM7)"),
        ];

        let chosen = select_port(&candidates).expect("Expected a port");
        assert_eq!(chosen.device, "COM7");
    }

    #[test]
    fn test_falls_back_to_first_non_debug_port() {
        let candidates = vec![
            PortCandidate::new("/dev/cu.DEBUG-console", "n/a"),
            PortCandidate::new("/dev/ttyS0", "PCI serial port"),
            PortCandidate::new("/dev/ttyS1", "PCI serial port"),
        ];

        let chosen = select_port(&candidates).expect("Expected a port");
        assert_eq!(chosen.device, "/dev/ttyS0");
    }

    #[test]
    fn test_never_selects_debug_console() {
        let candidates = vec![PortCandidate::new("/dev/cu.usbmodem-debug", "n/a (debug console)")];

        assert!(select_port(&candidates).is_none());
        assert!(select_port(&[]).is_none());
    }

    #[test]
    fn test_override_skips_enumeration() {
        let port = discover_port(Some("/dev/cu.usbmodem1101"), &BrokenBackend)
            .expect("Override should be used verbatim");
        assert_eq!(port, "/dev/cu.usbmodem1101");
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let backend = ListingBackend(vec![PortCandidate::new("/dev/ttyACM0", "n/a")]);

        let port = discover_port(Some(""), &backend).expect("Expected discovery to run");
        assert_eq!(port, "/dev/ttyACM0");
    }

    #[test]
    fn test_no_ports_is_device_not_found() {
        let backend = ListingBackend(vec![]);

        assert!(matches!(
            discover_port(None, &backend),
            Err(ChannelError::DeviceNotFound)
        ));
    }

    #[test]
    fn test_enumeration_failure_is_reported() {
        assert!(matches!(
            discover_port(None, &BrokenBackend),
            Err(ChannelError::Enumerate(_))
        ));
    }
}
