//! Serial link to the microcontroller.
//!
//! The port is opened 8N1 without flow control and with a zero timeout, so
//! reads during the handshake return immediately whether or not a byte is
//! waiting.  Once the handshake is done the timeout is raised to the frame
//! write timeout.

use std::io::{self, Read, Write};
use std::time::Duration;

use ambientled_core::ByteSource;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::application::send_loop::{Transport, TransportError};

/// Used when frame writes should block indefinitely.
const BLOCKING_WRITE_TIMEOUT: Duration = Duration::from_secs(3600);

pub struct SerialLink {
    port: Box<dyn SerialPort>,
    endpoint: String,
}

impl SerialLink {
    /// Opens `path` at `baud_rate`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::OpenSerial`] if the device cannot be opened
    /// or configured.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let endpoint = format!("{path}@{baud_rate}");
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| TransportError::OpenSerial {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        debug!("serial port {endpoint} open");
        Ok(Self { port, endpoint })
    }

    /// Sets the timeout for subsequent writes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::OpenSerial`] if the port rejects the setting.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        let timeout = timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(BLOCKING_WRITE_TIMEOUT);
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::OpenSerial {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            })
    }
}

impl ByteSource for SerialLink {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl Transport for SerialLink {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.port
            .write_all(frame)
            .and_then(|()| self.port.flush())
            .map_err(|source| TransportError::Write {
                endpoint: self.endpoint.clone(),
                source,
            })
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        debug!("serial port {} closed", self.endpoint);
    }
}
