//! Pipeline wiring: from a validated topology to two running loop threads.
//!
//! # Setup order
//!
//! ```text
//! build()
//!  ├─ one StripBuffer per strip (all zeros)
//!  ├─ one capture session per segment    -> CaptureLoop
//!  └─ one controller link per strip      -> SendLoop
//! start()
//!  ├─ thread "capture-loop"  (period 1/fps)
//!  └─ thread "send-loop"     (period 1/ups)
//! ```
//!
//! Any setup failure aborts the build.  Whatever was already opened is
//! dropped on the way out, which destroys capture sessions and closes links.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ambientled_core::{StripBuffer, Topology};
use thiserror::Error;
use tracing::{debug, error, info};

use super::backoff::BackoffPolicy;
use super::capture_loop::{CaptureError, CaptureLoop, CaptureRequest, CaptureService, StripCapture};
use super::send_loop::{DeviceConnector, SendLoop, TransportError};

/// Fatal errors while building the pipeline.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("strip {strip} segment {segment}: {source}")]
    Capture {
        strip: usize,
        segment: usize,
        #[source]
        source: CaptureError,
    },

    #[error("strip {strip}: {source}")]
    Transport {
        strip: usize,
        #[source]
        source: TransportError,
    },

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Both loops, fully set up but not yet running.
pub struct Pipeline {
    buffers: Vec<Arc<StripBuffer>>,
    capture: CaptureLoop,
    send: SendLoop,
}

impl Pipeline {
    /// Opens every capture session and every controller link for `topology`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Capture`] for the first segment whose session
    /// cannot be created, or [`SetupError::Transport`] for the first strip
    /// whose controller cannot be reached or does not complete its handshake.
    pub fn build(
        topology: &Topology,
        capture_service: &dyn CaptureService,
        connector: Arc<dyn DeviceConnector>,
        backoff: BackoffPolicy,
    ) -> Result<Self, SetupError> {
        let timing = *topology.timing();
        let buffers: Vec<Arc<StripBuffer>> = topology
            .strips()
            .iter()
            .map(|strip| Arc::new(StripBuffer::new(strip.leds)))
            .collect();

        let mut captures = Vec::with_capacity(buffers.len());
        for (strip_index, (strip, buffer)) in topology.strips().iter().zip(&buffers).enumerate() {
            let mut strip_capture = StripCapture::new(strip_index, Arc::clone(buffer));
            for (segment_index, segment) in strip.segments.iter().enumerate() {
                let request = CaptureRequest {
                    display: segment.display.clone(),
                    rect: segment.rect,
                    orientation: segment.orientation,
                    length: segment.placement.length,
                    fps: timing.fps,
                };
                let handle = capture_service.create_capture(&request).map_err(|source| {
                    SetupError::Capture {
                        strip: strip_index,
                        segment: segment_index,
                        source,
                    }
                })?;
                debug!(
                    "strip {strip_index} segment {segment_index}: capture session open on {:?} at {:?}",
                    segment.display, segment.rect
                );
                strip_capture.push_segment(segment_index, segment.placement, handle);
            }
            captures.push(strip_capture);
        }

        let mut send = SendLoop::new(timing, Arc::clone(&connector), backoff);
        for (strip_index, (strip, buffer)) in topology.strips().iter().zip(&buffers).enumerate() {
            let transport = connector
                .connect(strip, &timing)
                .map_err(|source| SetupError::Transport {
                    strip: strip_index,
                    source,
                })?;
            info!(
                "strip {strip_index}: {} controller at {} ready ({} LEDs)",
                strip.device.type_name(),
                strip.device,
                strip.leds
            );
            send.push_link(strip_index, strip.clone(), Arc::clone(buffer), transport);
        }

        Ok(Self {
            buffers,
            capture: CaptureLoop::new(timing.capture_period(), captures),
            send,
        })
    }

    /// Shared strip buffers in topology order.
    pub fn buffers(&self) -> &[Arc<StripBuffer>] {
        &self.buffers
    }

    /// Splits the pipeline into its two loops for manual ticking.
    pub fn into_loops(self) -> (CaptureLoop, SendLoop) {
        (self.capture, self.send)
    }

    /// Starts both loops on dedicated named threads.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Spawn`] if a thread cannot be created; the
    /// other loop, if already started, is stopped before returning.
    pub fn start(self, running: Arc<AtomicBool>) -> Result<PipelineHandle, SetupError> {
        let Pipeline {
            capture: mut capture_loop,
            send: mut send_loop,
            ..
        } = self;

        let capture = {
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("capture-loop".to_string())
                .spawn(move || capture_loop.run(&running))
                .map_err(|source| SetupError::Spawn {
                    name: "capture-loop",
                    source,
                })?
        };

        let send = {
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("send-loop".to_string())
                .spawn(move || send_loop.run(&running))
        };
        let send = match send {
            Ok(handle) => handle,
            Err(source) => {
                running.store(false, Ordering::Relaxed);
                join_loop("capture-loop", capture);
                return Err(SetupError::Spawn {
                    name: "send-loop",
                    source,
                });
            }
        };

        Ok(PipelineHandle {
            running,
            capture: Some(capture),
            send: Some(send),
        })
    }
}

/// Handle to the running loop threads.
pub struct PipelineHandle {
    running: Arc<AtomicBool>,
    capture: Option<JoinHandle<()>>,
    send: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Returns `true` while both loop threads are alive.
    pub fn is_running(&self) -> bool {
        self.dead_loop().is_none()
    }

    /// Names the first loop thread that has exited, if any.
    ///
    /// A loop only exits on its own by panicking, so a `Some` while the
    /// running flag is still set means the pipeline is dead.
    pub fn dead_loop(&self) -> Option<&'static str> {
        [("capture-loop", &self.capture), ("send-loop", &self.send)]
            .into_iter()
            .find(|(_, h)| h.as_ref().map_or(true, JoinHandle::is_finished))
            .map(|(name, _)| name)
    }

    /// Clears the running flag and waits for both loops to finish.
    ///
    /// The send loop blanks every strip on its way out.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.capture.take() {
            join_loop("capture-loop", handle);
        }
        if let Some(handle) = self.send.take() {
            join_loop("send-loop", handle);
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_loop(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("{name} thread panicked");
    }
}
