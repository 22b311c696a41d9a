//! Send loop use case.
//!
//! Once per update period the loop copies every strip buffer out under its
//! lock and writes the copy to the strip's controller.  The lock is released
//! before the write, so a slow controller never stalls the capture loop.
//!
//! A failed write drops that strip's link.  Once its backoff delay has
//! passed the strip is reconnected (header and handshake again) on a
//! short-lived `reconnect-<strip>` thread, so a controller that is slow to
//! answer never delays the frames of the other strips.  The finished link is
//! picked up by the next tick.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ambientled_core::{HandshakeError, Strip, StripBuffer, Timing};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::backoff::{Backoff, BackoffPolicy};

/// Error type for controller links.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The controller address did not resolve to any socket address.
    #[error("could not resolve {endpoint}")]
    Resolve { endpoint: String },

    /// The TCP connection could not be established.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The serial device could not be opened or configured.
    #[error("failed to open serial port {endpoint}: {reason}")]
    OpenSerial { endpoint: String, reason: String },

    /// The serial controller did not acknowledge its header.
    #[error("handshake with {endpoint} failed: {source}")]
    Handshake {
        endpoint: String,
        #[source]
        source: HandshakeError,
    },

    /// Writing the header or a frame failed.
    #[error("write to {endpoint} failed: {source}")]
    Write {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// A background reconnect could not be started or ended without a result.
    #[error("reconnect to {endpoint} aborted: {reason}")]
    ReconnectAborted { endpoint: String, reason: String },
}

/// An established, header-initialised link to one controller.
///
/// Dropping the transport closes the link.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Writes one complete frame (`3 × leds` bytes).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Write`] if the bytes could not be delivered.
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}

/// Opens controller links.
///
/// `connect` performs the whole setup sequence: open the link, send the
/// calibration header and, for serial controllers, wait for the handshake.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceConnector: Send + Sync {
    /// # Errors
    ///
    /// Returns [`TransportError`] if any step of the setup fails.
    fn connect(&self, strip: &Strip, timing: &Timing) -> Result<Box<dyn Transport>, TransportError>;
}

// ── Loop state ────────────────────────────────────────────────────────────────

type ConnectOutcome = Result<Box<dyn Transport>, TransportError>;

struct Link {
    index: usize,
    strip: Strip,
    endpoint: String,
    buffer: Arc<StripBuffer>,
    transport: Option<Box<dyn Transport>>,
    /// Result slot of the reconnect thread, while one is running.
    reconnect: Option<Receiver<ConnectOutcome>>,
    backoff: Backoff,
}

impl Link {
    /// Starts connecting on a background thread.
    fn start_reconnect(
        &mut self,
        connector: &Arc<dyn DeviceConnector>,
        timing: Timing,
    ) -> Result<(), TransportError> {
        let (tx, rx) = mpsc::channel();
        let connector = Arc::clone(connector);
        let strip = self.strip.clone();
        thread::Builder::new()
            .name(format!("reconnect-{}", self.index))
            .spawn(move || {
                // The loop may be gone by the time the attempt finishes; the
                // link is then simply dropped.
                let _ = tx.send(connector.connect(&strip, &timing));
            })
            .map_err(|e| TransportError::ReconnectAborted {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            })?;
        debug!("strip {} ({}): reconnecting", self.index, self.endpoint);
        self.reconnect = Some(rx);
        Ok(())
    }

    /// Returns the outcome of the running reconnect once it has finished.
    fn finished_reconnect(&mut self) -> Option<ConnectOutcome> {
        let outcome = match self.reconnect.as_ref()?.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(TransportError::ReconnectAborted {
                endpoint: self.endpoint.clone(),
                reason: "reconnect thread exited without a result".to_string(),
            }),
        };
        self.reconnect = None;
        Some(outcome)
    }
}

/// Outcome counts for one send tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendTick {
    /// Strips whose frame was written.
    pub sent: usize,
    /// Strips whose write or reconnect failed this tick.
    pub failed: usize,
    /// Strips that were reconnected this tick.
    pub reconnected: usize,
    /// Disconnected strips waiting out their backoff or a running reconnect.
    pub waiting: usize,
}

/// The periodic send task.
pub struct SendLoop {
    timing: Timing,
    connector: Arc<dyn DeviceConnector>,
    backoff: BackoffPolicy,
    links: Vec<Link>,
    scratch: Vec<u8>,
}

impl SendLoop {
    pub fn new(timing: Timing, connector: Arc<dyn DeviceConnector>, backoff: BackoffPolicy) -> Self {
        Self {
            timing,
            connector,
            backoff,
            links: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Adds a strip with its already connected transport.
    pub fn push_link(
        &mut self,
        index: usize,
        strip: Strip,
        buffer: Arc<StripBuffer>,
        transport: Box<dyn Transport>,
    ) {
        self.links.push(Link {
            index,
            endpoint: strip.device.to_string(),
            strip,
            buffer,
            transport: Some(transport),
            reconnect: None,
            backoff: Backoff::new(self.backoff),
        });
    }

    pub fn period(&self) -> Duration {
        self.timing.send_period()
    }

    /// Returns how many strips currently have an open link.
    pub fn connected(&self) -> usize {
        self.links.iter().filter(|l| l.transport.is_some()).count()
    }

    /// Sends every strip buffer once.
    ///
    /// Dropped links whose backoff has elapsed at `now` start a background
    /// reconnect; reconnects that finished since the last tick are adopted
    /// (and sent to) here.  The tick itself never waits on a connect.
    pub fn tick(&mut self, now: Instant) -> SendTick {
        let mut report = SendTick::default();

        for link in &mut self.links {
            if link.transport.is_none() {
                match link.finished_reconnect() {
                    Some(Ok(transport)) => {
                        info!(
                            "strip {} ({}): reconnected after {} failed attempts",
                            link.index,
                            link.endpoint,
                            link.backoff.failures()
                        );
                        link.backoff.reset();
                        link.transport = Some(transport);
                        report.reconnected += 1;
                    }
                    Some(Err(e)) => {
                        let delay = link.backoff.fail(now);
                        warn!(
                            "strip {} ({}): reconnect failed: {e}; retrying in {delay:?}",
                            link.index, link.endpoint
                        );
                        report.failed += 1;
                        continue;
                    }
                    None if link.reconnect.is_some() || !link.backoff.ready(now) => {
                        report.waiting += 1;
                        continue;
                    }
                    None => {
                        match link.start_reconnect(&self.connector, self.timing) {
                            Ok(()) => report.waiting += 1,
                            Err(e) => {
                                let delay = link.backoff.fail(now);
                                warn!(
                                    "strip {} ({}): {e}; retrying in {delay:?}",
                                    link.index, link.endpoint
                                );
                                report.failed += 1;
                            }
                        }
                        continue;
                    }
                }
            }

            link.buffer.copy_into(&mut self.scratch);
            let Some(transport) = link.transport.as_mut() else {
                continue;
            };
            match transport.send(&self.scratch) {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    link.transport = None;
                    let delay = link.backoff.fail(now);
                    warn!(
                        "strip {} ({}): {e}; link dropped, reconnecting in {delay:?}",
                        link.index, link.endpoint
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Ticks every update period until `running` is cleared, then turns the
    /// LEDs off and closes every link.
    pub fn run(&mut self, running: &AtomicBool) {
        let period = self.period();
        info!(
            "send loop started: {} strips every {period:?}",
            self.links.len()
        );

        while running.load(Ordering::Relaxed) {
            let started = Instant::now();
            self.tick(started);
            if let Some(remaining) = period.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }

        self.shutdown();
        info!("send loop stopped");
    }

    /// Sends one all-zero frame to every connected strip and closes the links.
    ///
    /// Reconnects still running are abandoned; their link is closed as soon
    /// as the attempt finishes.
    pub fn shutdown(&mut self) {
        for link in &mut self.links {
            if link.reconnect.take().is_some() {
                debug!(
                    "strip {} ({}): abandoning reconnect in progress",
                    link.index, link.endpoint
                );
            }
            let Some(mut transport) = link.transport.take() else {
                continue;
            };
            let blank = vec![0u8; link.buffer.byte_len()];
            match transport.send(&blank) {
                Ok(()) => debug!("strip {} ({}): LEDs cleared", link.index, link.endpoint),
                Err(e) => warn!(
                    "strip {} ({}): could not clear LEDs: {e}",
                    link.index, link.endpoint
                ),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
