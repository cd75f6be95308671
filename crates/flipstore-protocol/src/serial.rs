//! Serial port transport.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::debug;
use serialport::{ClearBuffer, SerialPort};

use crate::transport::{is_poll_timeout, Transport};

/// A device attached to a local serial port (USB CDC or UART).
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    read_timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create a transport for the named port. Nothing is opened until `open`.
    pub fn new(port_name: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        SerialTransport {
            port_name: port_name.into(),
            baud_rate,
            read_timeout,
            port: None,
        }
    }

    /// Get the port name.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is not open"))
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> io::Result<()> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(io::Error::from)?;
        port.clear(ClearBuffer::All).map_err(io::Error::from)?;
        debug!("Opened {} at {} baud", self.port_name, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.port.take().is_some() {
            debug!("Closed {}", self.port_name);
        }
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        Write::write_all(&mut *port, data)?;
        Write::flush(port)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let port = self.port()?;
        match Read::read(port, buf) {
            Ok(n) => Ok(n),
            Err(e) if is_poll_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let port = self.port()?;
        let n = port.bytes_to_read().map_err(io::Error::from)?;
        Ok(n as usize)
    }
}
