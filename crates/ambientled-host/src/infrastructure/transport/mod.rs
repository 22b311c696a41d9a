//! Controller links.
//!
//! [`DeviceLinkConnector`] is the production [`DeviceConnector`].  For every
//! strip it:
//!
//! 1. opens the link: TCP with `TCP_NODELAY` for the network controller,
//!    8N1 without flow control for the serial controller;
//! 2. sends the calibration header in the layout of the controller type;
//! 3. for serial controllers, polls for the readiness byte;
//! 4. arms the write timeout used for frame writes.
//!
//! # Sub-modules
//!
//! - **`tcp`** – network controller link.
//! - **`serial`** – serial controller link.
//! - **`mock`** – in-memory connector that records headers and frames.

use std::time::Duration;

use ambientled_core::{perform_handshake, CalibrationHeader, DeviceKind, HandshakePolicy, Strip, Timing};
use tracing::{debug, info};

use crate::application::send_loop::{DeviceConnector, Transport, TransportError};

pub mod mock;
pub mod serial;
pub mod tcp;

/// Timeouts for opening and using controller links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Upper bound for establishing a TCP connection.
    pub connect_timeout: Duration,
    /// Upper bound for one frame write; `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
    /// Readiness polling schedule for serial controllers.
    pub handshake: HandshakePolicy,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(2000),
            write_timeout: Some(Duration::from_millis(250)),
            handshake: HandshakePolicy::default(),
        }
    }
}

/// Opens real TCP and serial links.
#[derive(Debug, Clone, Default)]
pub struct DeviceLinkConnector {
    settings: LinkSettings,
}

impl DeviceLinkConnector {
    pub fn new(settings: LinkSettings) -> Self {
        Self { settings }
    }
}

impl DeviceConnector for DeviceLinkConnector {
    fn connect(&self, strip: &Strip, timing: &Timing) -> Result<Box<dyn Transport>, TransportError> {
        let header = CalibrationHeader::for_strip(strip, timing).encode_for(&strip.device);

        match &strip.device {
            DeviceKind::Network { host, port } => {
                let mut link = tcp::TcpLink::connect(host, *port, self.settings.connect_timeout)?;
                link.send(&header)?;
                link.set_write_timeout(self.settings.write_timeout)?;
                info!("connected to network controller {host}:{port}");
                Ok(Box::new(link))
            }
            DeviceKind::Serial { path, baud_rate } => {
                let mut link = serial::SerialLink::open(path, *baud_rate)?;
                link.send(&header)?;
                perform_handshake(&mut link, &self.settings.handshake).map_err(|source| {
                    TransportError::Handshake {
                        endpoint: strip.device.to_string(),
                        source,
                    }
                })?;
                debug!("serial controller {path} acknowledged its header");
                link.set_write_timeout(self.settings.write_timeout)?;
                info!("connected to serial controller {path} at {baud_rate} baud");
                Ok(Box::new(link))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambientled_core::Calibration;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    fn network_strip(port: u16) -> Strip {
        Strip {
            device: DeviceKind::Network {
                host: "127.0.0.1".to_string(),
                port,
            },
            leds: 2,
            calibration: Calibration {
                max_brightness: 200,
                red: 1.0,
                green: 0.5,
                blue: 0.25,
            },
            segments: vec![],
        }
    }

    fn timing() -> Timing {
        Timing {
            fps: 30,
            ups: 60,
            lerp: 0.5,
        }
    }

    #[test]
    fn test_network_connect_sends_header_before_frames() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let controller = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = vec![0u8; 28 + 6];
            stream.read_exact(&mut received).unwrap();
            received
        });
        let strip = network_strip(port);

        // Act
        let mut transport = DeviceLinkConnector::default()
            .connect(&strip, &timing())
            .expect("controller is listening");
        transport.send(&[1, 2, 3, 4, 5, 6]).unwrap();

        // Assert
        let received = controller.join().unwrap();
        let expected_header = CalibrationHeader::for_strip(&strip, &timing()).encode_network();
        assert_eq!(&received[..28], &expected_header[..]);
        assert_eq!(&received[28..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_network_connect_to_closed_port_fails() {
        // Arrange – grab a free port, then close it.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        // Act
        let result = DeviceLinkConnector::default().connect(&network_strip(port), &timing());

        // Assert
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn test_missing_serial_device_fails_to_open() {
        let strip = Strip {
            device: DeviceKind::Serial {
                path: "/dev/ambientled-does-not-exist".to_string(),
                baud_rate: 981_600,
            },
            ..network_strip(0)
        };

        let result = DeviceLinkConnector::default().connect(&strip, &timing());

        assert!(matches!(result, Err(TransportError::OpenSerial { .. })));
    }

    #[test]
    fn test_default_link_settings() {
        let settings = LinkSettings::default();

        assert_eq!(settings.connect_timeout, Duration::from_secs(2));
        assert_eq!(settings.write_timeout, Some(Duration::from_millis(250)));
        assert_eq!(settings.handshake.attempts, 10);
    }
}
