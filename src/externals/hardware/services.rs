use std::{
    io::{self, Read, Write},
    time::Duration,
};

use serialport::{SerialPort, SerialPortType};
use thiserror::Error;
use tracing::{debug, instrument, trace};

use super::discovery::PortCandidate;

/// An open, byte oriented link to the buzzer controller.
///
/// `bytes_to_read` must not block; it reports what is already buffered.
pub trait SerialLink: Read + Write + Send {
    fn bytes_to_read(&self) -> io::Result<u32>;
}

/// This service separates the operating system serial layer from the
/// command channel logic, which lets the channel be tested without
/// real hardware attached.
pub trait SerialBackend {
    /// List the serial devices currently present, in enumeration order.
    fn list_ports(&self) -> Result<Vec<PortCandidate>, ChannelError>;

    /// Open `port` at `baud_rate` with a bounded read timeout.
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialLink>, ChannelError>;
}

#[derive(Error, Debug)]
pub enum ChannelError {
    /// Discovery found no usable serial device.
    #[error("No serial device found.")]
    DeviceNotFound,

    /// The operating system could not list serial devices.
    #[error("Failed to enumerate serial ports. Error: {0}")]
    Enumerate(serialport::Error),

    /// Opening the device failed. Busy, missing permissions or unplugged.
    #[error("Failed to open serial port '{port}'. Error: {source}")]
    ConnectFailed {
        port: String,
        source: serialport::Error,
    },

    /// A command was issued while no link was open.
    #[error("No serial connection.")]
    NotConnected,

    /// An established link stopped accepting writes.
    #[error("Failed to write to serial port. Error: {0}")]
    WriteFailed(io::Error),
}

impl SerialLink for Box<dyn SerialPort> {
    fn bytes_to_read(&self) -> io::Result<u32> {
        SerialPort::bytes_to_read(&**self).map_err(io::Error::from)
    }
}

/// Serial backend built on the `serialport` crate.
pub struct SerialBackendActual;

impl SerialBackend for SerialBackendActual {
    #[instrument(skip_all)]
    fn list_ports(&self) -> Result<Vec<PortCandidate>, ChannelError> {
        let ports = serialport::available_ports().map_err(ChannelError::Enumerate)?;
        trace!("Found {} ports.", ports.len());

        Ok(ports
            .into_iter()
            .map(|port| PortCandidate::new(port.port_name, describe_port_type(&port.port_type)))
            .collect())
    }

    #[instrument(skip_all)]
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialLink>, ChannelError> {
        debug!("Opening '{}' at {} baud.", port, baud_rate);
        let link = serialport::new(port, baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|source| ChannelError::ConnectFailed {
                port: port.to_string(),
                source,
            })?;

        Ok(Box::new(link))
    }
}

/// Human readable description of a port, used by discovery to spot
/// Arduino-like devices and debug consoles.
fn describe_port_type(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb_info) => {
            let parts: Vec<&str> = [usb_info.manufacturer.as_deref(), usb_info.product.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if parts.is_empty() {
                format!("USB {:04x}:{:04x}", usb_info.vid, usb_info.pid)
            } else {
                parts.join(" ")
            }
        }
        SerialPortType::PciPort => "PCI serial port".into(),
        SerialPortType::BluetoothPort => "Bluetooth serial port".into(),
        SerialPortType::Unknown => "n/a".into(),
    }
}

#[cfg(test)]
mod tests {
    use serialport::UsbPortInfo;

    use super::*;

    #[test]
    fn test_usb_description_uses_manufacturer_and_product() {
        let port_type = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x10c4,
            pid: 0xea60,
            serial_number: None,
            manufacturer: Some("Silicon Labs".into()),
            product: Some("CP210x UART Bridge".into()),
        });

        assert_eq!(
            describe_port_type(&port_type),
            "Silicon Labs CP210x UART Bridge"
        );
    }

    #[test]
    fn test_usb_description_falls_back_to_ids() {
        let port_type = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x2341,
            pid: 0x0043,
            serial_number: None,
            manufacturer: None,
            product: None,
        });

        assert_eq!(describe_port_type(&port_type), "USB 2341:0043");
    }
}
