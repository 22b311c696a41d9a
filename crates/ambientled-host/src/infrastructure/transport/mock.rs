//! In-memory controller links for unit and integration testing.
//!
//! [`RecordingConnector`] behaves like the production connector minus the
//! wire: `connect` records the calibration header the strip would receive
//! and hands out a [`RecordingTransport`] that records every frame.  Tests
//! can make connects fail per endpoint and make the next N frame writes of
//! an endpoint fail.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ambientled_core::{CalibrationHeader, Strip, Timing};

use crate::application::send_loop::{DeviceConnector, Transport, TransportError};

#[derive(Default)]
struct Recorder {
    headers: HashMap<String, Vec<Vec<u8>>>,
    frames: HashMap<String, Vec<Vec<u8>>>,
    refused: HashSet<String>,
    pending_send_failures: HashMap<String, usize>,
}

type Shared = Arc<Mutex<Recorder>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Recorder> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`DeviceConnector`] that records instead of connecting.
///
/// Endpoints are keyed by the strip device's display form
/// (`"host:port"` or `"path@baud"`).
#[derive(Clone, Default)]
pub struct RecordingConnector {
    shared: Shared,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future connect to `endpoint` fail until [`Self::accept`].
    pub fn refuse(&self, endpoint: &str) {
        lock(&self.shared).refused.insert(endpoint.to_string());
    }

    /// Lets connects to `endpoint` succeed again.
    pub fn accept(&self, endpoint: &str) {
        lock(&self.shared).refused.remove(endpoint);
    }

    /// Makes the next `count` frame writes to `endpoint` fail.
    pub fn fail_next_sends(&self, endpoint: &str, count: usize) {
        lock(&self.shared)
            .pending_send_failures
            .insert(endpoint.to_string(), count);
    }

    /// Headers sent to `endpoint`, one per successful connect.
    pub fn headers(&self, endpoint: &str) -> Vec<Vec<u8>> {
        lock(&self.shared).headers.get(endpoint).cloned().unwrap_or_default()
    }

    /// Frames delivered to `endpoint`, in order.
    pub fn frames(&self, endpoint: &str) -> Vec<Vec<u8>> {
        lock(&self.shared).frames.get(endpoint).cloned().unwrap_or_default()
    }
}

impl DeviceConnector for RecordingConnector {
    fn connect(&self, strip: &Strip, timing: &Timing) -> Result<Box<dyn Transport>, TransportError> {
        let endpoint = strip.device.to_string();
        let mut recorder = lock(&self.shared);
        if recorder.refused.contains(&endpoint) {
            return Err(TransportError::Connect {
                endpoint,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused by test"),
            });
        }
        let header = CalibrationHeader::for_strip(strip, timing).encode_for(&strip.device);
        recorder.headers.entry(endpoint.clone()).or_default().push(header);
        Ok(Box::new(RecordingTransport {
            endpoint,
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Link handed out by [`RecordingConnector`].
pub struct RecordingTransport {
    endpoint: String,
    shared: Shared,
}

impl Transport for RecordingTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let mut recorder = lock(&self.shared);
        if let Some(remaining) = recorder.pending_send_failures.get_mut(&self.endpoint) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::Write {
                    endpoint: self.endpoint.clone(),
                    source: io::Error::new(io::ErrorKind::BrokenPipe, "failed by test"),
                });
            }
        }
        recorder
            .frames
            .entry(self.endpoint.clone())
            .or_default()
            .push(frame.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambientled_core::{Calibration, DeviceKind};

    fn serial_strip() -> Strip {
        Strip {
            device: DeviceKind::Serial {
                path: "/dev/ttyACM0".to_string(),
                baud_rate: 981_600,
            },
            leds: 1,
            calibration: Calibration {
                max_brightness: 100,
                red: 1.0,
                green: 1.0,
                blue: 1.0,
            },
            segments: vec![],
        }
    }

    fn timing() -> Timing {
        Timing {
            fps: 30,
            ups: 30,
            lerp: 1.0,
        }
    }

    #[test]
    fn test_connect_records_device_specific_header() {
        let connector = RecordingConnector::new();

        connector.connect(&serial_strip(), &timing()).unwrap();

        let headers = connector.headers("/dev/ttyACM0@981600");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].len(), 16);
    }

    #[test]
    fn test_refused_endpoint_fails_until_accepted() {
        let connector = RecordingConnector::new();
        connector.refuse("/dev/ttyACM0@981600");

        assert!(connector.connect(&serial_strip(), &timing()).is_err());
        connector.accept("/dev/ttyACM0@981600");
        assert!(connector.connect(&serial_strip(), &timing()).is_ok());
    }

    #[test]
    fn test_scripted_send_failures_then_recording() {
        // Arrange
        let connector = RecordingConnector::new();
        let mut transport = connector.connect(&serial_strip(), &timing()).unwrap();
        connector.fail_next_sends("/dev/ttyACM0@981600", 1);

        // Act
        let first = transport.send(&[1, 2, 3]);
        let second = transport.send(&[4, 5, 6]);

        // Assert
        assert!(first.is_err());
        assert!(second.is_ok());
        assert_eq!(connector.frames("/dev/ttyACM0@981600"), vec![vec![4, 5, 6]]);
    }
}
