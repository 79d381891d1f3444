//! Serial link handling
//!
//! [`SerialLink`] is the boundary to the raw byte-level driver: blocking
//! write and single-byte read, each bounded by a deadline. [`SerialPortLink`]
//! implements it on top of the `serialport` crate.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::BTreeMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::debug;

use super::{ProtocolError, DEFAULT_BAUD_RATE};

/// Blocking byte transport to a mount controller
pub trait SerialLink: Send {
    /// Transmit all of `data`, failing with [`ProtocolError::Timeout`] if the
    /// transmit does not complete within `deadline`
    fn write_bytes(&mut self, data: &[u8], deadline: Duration) -> Result<(), ProtocolError>;

    /// Read one byte; `Ok(None)` when nothing arrived within `deadline`
    fn read_byte(&mut self, deadline: Duration) -> Result<Option<u8>, ProtocolError>;

    /// Discard anything waiting in the input buffer
    fn clear_input(&mut self) -> Result<(), ProtocolError>;

    /// Human readable name for logs
    fn describe(&self) -> String;
}

/// A serial port a controller may be attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    /// USB vendor and product id, for USB adapters
    pub usb_id: Option<(u16, u16)>,
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            usb_id: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                usb_id: Some((usb.vid, usb.pid)),
                product: usb.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// USB-serial adapters first, then CDC-ACM devices, then anything else;
/// numeric suffixes sort as numbers
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let base = name.rsplit('/').next().unwrap_or(name);
    let rank = [("ttyUSB", 0u8), ("ttyACM", 1u8)]
        .into_iter()
        .find_map(|(prefix, rank)| {
            base.strip_prefix(prefix)
                .map(|n| (rank, n.parse().unwrap_or(usize::MAX)))
        });
    match rank {
        Some((rank, n)) => (rank, n, base.to_string()),
        None => (2, 0, base.to_string()),
    }
}

/// Ports reported by the OS plus, on Linux, any `/dev/ttyUSB*`/`ttyACM*`
/// node it missed, in deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: BTreeMap<String, PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|info| {
            let port = PortInfo::from(info);
            (port.name.clone(), port)
        })
        .collect();

    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        let nodes = entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|n| n.starts_with("ttyUSB") || n.starts_with("ttyACM"));
        for node in nodes {
            let name = format!("/dev/{node}");
            ports
                .entry(name.clone())
                .or_insert_with(|| PortInfo::bare(name));
        }
    }

    let mut ports: Vec<PortInfo> = ports.into_values().collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// Open a serial port configured 8N1 without flow control
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

    let port = serialport::new(name, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(name.to_string()),
            _ => ProtocolError::SerialError(e.to_string()),
        })?;
    debug!(port = name, baud, "serial port opened");
    Ok(port)
}

/// [`SerialLink`] over a `serialport` handle
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialPortLink {
    pub fn open(name: &str, baud_rate: u32) -> Result<Self, ProtocolError> {
        let port = open_port(name, Some(baud_rate))?;
        Ok(Self {
            port,
            name: name.to_string(),
        })
    }

    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        let name = port.name().unwrap_or_else(|| "serial".to_string());
        Self { port, name }
    }

    fn set_deadline(&mut self, deadline: Duration) -> Result<(), ProtocolError> {
        self.port
            .set_timeout(deadline.max(Duration::from_millis(1)))
            .map_err(|e| ProtocolError::SerialError(e.to_string()))
    }
}

impl SerialLink for SerialPortLink {
    fn write_bytes(&mut self, data: &[u8], deadline: Duration) -> Result<(), ProtocolError> {
        self.set_deadline(deadline)?;
        match self.port.write_all(data).and_then(|_| self.port.flush()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::TimedOut => Err(ProtocolError::Timeout),
            Err(e) => Err(ProtocolError::SerialError(e.to_string())),
        }
    }

    fn read_byte(&mut self, deadline: Duration) -> Result<Option<u8>, ProtocolError> {
        self.set_deadline(deadline)?;
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(None)
            }
            Err(e) => Err(ProtocolError::SerialError(e.to_string())),
        }
    }

    fn clear_input(&mut self) -> Result<(), ProtocolError> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports_does_not_fail() {
        let ports = list_ports();
        let mut sorted = ports.clone();
        sorted.sort_by_key(|p| port_sort_key(&p.name));
        assert_eq!(ports, sorted);
    }

    #[test]
    fn test_port_order() {
        let mut ports: Vec<PortInfo> = [
            "/dev/ttyACM1",
            "/dev/ttyUSB10",
            "/dev/ttyS0",
            "/dev/ttyUSB2",
            "/dev/ttyACM0",
        ]
        .into_iter()
        .map(|n| PortInfo::bare(n.to_string()))
        .collect();
        ports.sort_by_key(|p| port_sort_key(&p.name));
        let names: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            ["/dev/ttyUSB2", "/dev/ttyUSB10", "/dev/ttyACM0", "/dev/ttyACM1", "/dev/ttyS0"]
        );
    }
}
