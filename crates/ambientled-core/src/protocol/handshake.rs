//! Readiness handshake for serial controllers.
//!
//! After receiving its header the microcontroller resets its LED driver and
//! then reports a single status byte:
//!
//! | Byte   | Meaning                         |
//! |--------|---------------------------------|
//! | none/0 | still initialising, keep asking |
//! | 1      | ready, frames may follow        |
//! | ≥ 2    | initialisation failed           |
//!
//! The host polls a bounded number of times, sleeping between polls.

use std::io;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Status byte reported by a ready controller.
pub const READY: u8 = 1;

/// Non-blocking single-byte reader.
///
/// `Ok(None)` means no byte was available right now.
pub trait ByteSource {
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
}

/// Retry schedule for [`perform_handshake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakePolicy {
    /// Total number of reads before giving up.
    pub attempts: u32,
    /// Pause between reads that returned nothing.
    pub interval: Duration,
}

impl Default for HandshakePolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The controller reported a failure status.
    #[error("controller reported error status {0}")]
    DeviceError(u8),

    /// The controller never reported ready.
    #[error("controller not ready after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("I/O error while waiting for controller: {0}")]
    Io(#[from] io::Error),
}

/// Polls `source` until the controller reports ready.
///
/// Performs at most `policy.attempts` reads.  A failure status ends the
/// handshake immediately without further reads.
///
/// # Errors
///
/// - [`HandshakeError::DeviceError`] if the controller answers with a status ≥ 2.
/// - [`HandshakeError::Timeout`] if every attempt comes back empty or `0`.
/// - [`HandshakeError::Io`] if the underlying read fails.
pub fn perform_handshake<S>(source: &mut S, policy: &HandshakePolicy) -> Result<(), HandshakeError>
where
    S: ByteSource + ?Sized,
{
    for attempt in 1..=policy.attempts {
        match source.read_byte()?.unwrap_or(0) {
            READY => {
                debug!(attempt, "controller ready");
                return Ok(());
            }
            0 => {
                if attempt < policy.attempts {
                    thread::sleep(policy.interval);
                }
            }
            status => return Err(HandshakeError::DeviceError(status)),
        }
    }
    Err(HandshakeError::Timeout {
        attempts: policy.attempts,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a fixed script of reads; runs dry as `None`.
    struct ScriptedSource {
        script: VecDeque<io::Result<Option<u8>>>,
        reads: usize,
    }

    impl ScriptedSource {
        fn new(script: impl IntoIterator<Item = io::Result<Option<u8>>>) -> Self {
            Self {
                script: script.into_iter().collect(),
                reads: 0,
            }
        }

        fn bytes(bytes: &[u8]) -> Self {
            Self::new(bytes.iter().map(|b| Ok(Some(*b))))
        }
    }

    impl ByteSource for ScriptedSource {
        fn read_byte(&mut self) -> io::Result<Option<u8>> {
            self.reads += 1;
            self.script.pop_front().unwrap_or(Ok(None))
        }
    }

    fn fast_policy() -> HandshakePolicy {
        HandshakePolicy {
            attempts: 10,
            interval: Duration::ZERO,
        }
    }

    #[test]
    fn test_ready_after_eight_idle_reads_succeeds() {
        // Arrange
        let mut script = vec![0u8; 8];
        script.push(READY);
        let mut source = ScriptedSource::bytes(&script);

        // Act
        let result = perform_handshake(&mut source, &fast_policy());

        // Assert
        assert!(result.is_ok());
        assert_eq!(source.reads, 9);
    }

    #[test]
    fn test_eleven_idle_reads_time_out_after_ten() {
        // Arrange
        let mut source = ScriptedSource::bytes(&[0u8; 11]);

        // Act
        let result = perform_handshake(&mut source, &fast_policy());

        // Assert
        assert!(matches!(result, Err(HandshakeError::Timeout { attempts: 10 })));
        assert_eq!(source.reads, 10);
    }

    #[test]
    fn test_error_status_fails_without_further_reads() {
        // Arrange
        let mut source = ScriptedSource::bytes(&[2, READY]);

        // Act
        let result = perform_handshake(&mut source, &fast_policy());

        // Assert
        assert!(matches!(result, Err(HandshakeError::DeviceError(2))));
        assert_eq!(source.reads, 1);
    }

    #[test]
    fn test_missing_bytes_count_as_not_ready() {
        let mut source = ScriptedSource::new([Ok(None), Ok(None), Ok(Some(READY))]);

        assert!(perform_handshake(&mut source, &fast_policy()).is_ok());
        assert_eq!(source.reads, 3);
    }

    #[test]
    fn test_read_failure_is_propagated() {
        let mut source = ScriptedSource::new([Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "unplugged",
        ))]);

        let result = perform_handshake(&mut source, &fast_policy());

        assert!(matches!(result, Err(HandshakeError::Io(_))));
    }

    #[test]
    fn test_default_policy_matches_controller_timing() {
        let policy = HandshakePolicy::default();

        assert_eq!(policy.attempts, 10);
        assert_eq!(policy.interval, Duration::from_millis(100));
    }
}
