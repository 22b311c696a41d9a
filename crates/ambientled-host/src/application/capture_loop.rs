//! Capture loop use case.
//!
//! Once per capture period the loop walks every strip and, within each strip,
//! every segment in declared order: it pulls the latest frame from the
//! segment's capture handle and composites it into the strip buffer.
//!
//! A failed grab only affects its own segment.  The segment's LEDs keep the
//! last colors that were composited and every other segment carries on.  The
//! first failure of a run is logged at `warn`, repeats at `debug`, and the
//! recovery at `info`, so a display that is switched off for an hour does
//! not flood the log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ambientled_core::{CaptureRect, Orientation, Placement, StripBuffer, BYTES_PER_LED};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for capture sessions.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No capture backend exists for this platform or build.
    #[error("screen capture unavailable: {0}")]
    Unavailable(String),

    /// A capture session for a display rectangle could not be created.
    #[error("failed to open capture session on display {display:?}: {reason}")]
    SessionFailed { display: String, reason: String },

    /// A grab on an existing session failed.
    #[error("frame grab failed: {0}")]
    Grab(String),

    /// The backend returned a frame of the wrong size.
    #[error("capture returned {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },
}

/// Everything a backend needs to open a session for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Identifier of the display to capture from.
    pub display: String,
    /// Rectangle on that display, in pixels.
    pub rect: CaptureRect,
    /// Axis along which the rectangle is reduced.
    pub orientation: Orientation,
    /// Number of LEDs (output pixels) the rectangle is reduced to.
    pub length: usize,
    /// Rate at which the session will be grabbed.
    pub fps: u32,
}

impl CaptureRequest {
    /// Returns the `(width, height)` of the reduced image.
    pub fn output_size(&self) -> (usize, usize) {
        self.orientation.output_size(self.length)
    }

    /// Returns the size in bytes of one reduced RGB frame.
    pub fn frame_len(&self) -> usize {
        self.length * BYTES_PER_LED
    }
}

/// Process-scoped capture backend.
///
/// Implementations initialise any global state lazily on the first
/// [`CaptureService::create_capture`] call and must tolerate being asked
/// again.
pub trait CaptureService: Send + Sync {
    /// Opens a capture session for one segment.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError`] if the display cannot be opened or the
    /// backend is not available.
    fn create_capture(&self, request: &CaptureRequest)
        -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// One open capture session.  Dropping the handle destroys the session.
pub trait CaptureHandle: Send {
    /// Returns the latest reduced frame as packed RGB bytes.
    ///
    /// The slice is valid until the next call.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Grab`] if the backend could not produce a frame.
    fn grab(&mut self) -> Result<&[u8], CaptureError>;
}

// ── Loop state ────────────────────────────────────────────────────────────────

struct SegmentCapture {
    index: usize,
    placement: Placement,
    handle: Box<dyn CaptureHandle>,
    consecutive_failures: u32,
}

/// The capture sessions of one strip and the buffer they write into.
pub struct StripCapture {
    index: usize,
    buffer: Arc<StripBuffer>,
    segments: Vec<SegmentCapture>,
}

impl StripCapture {
    pub fn new(index: usize, buffer: Arc<StripBuffer>) -> Self {
        Self {
            index,
            buffer,
            segments: Vec::new(),
        }
    }

    /// Adds a segment session.  Segments are grabbed in the order added.
    pub fn push_segment(&mut self, index: usize, placement: Placement, handle: Box<dyn CaptureHandle>) {
        self.segments.push(SegmentCapture {
            index,
            placement,
            handle,
            consecutive_failures: 0,
        });
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Outcome counts for one capture tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureTick {
    /// Segments grabbed and composited.
    pub captured: usize,
    /// Segments whose grab failed this tick.
    pub failed: usize,
}

/// The periodic capture task.
pub struct CaptureLoop {
    period: Duration,
    strips: Vec<StripCapture>,
}

impl CaptureLoop {
    pub fn new(period: Duration, strips: Vec<StripCapture>) -> Self {
        Self { period, strips }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Grabs and composites every segment once.
    pub fn tick(&mut self) -> CaptureTick {
        let mut report = CaptureTick::default();

        for strip in &mut self.strips {
            for segment in &mut strip.segments {
                let expected = segment.placement.frame_len();
                match grab_checked(segment.handle.as_mut(), expected) {
                    Ok(frame) => {
                        strip.buffer.write_segment(&segment.placement, frame);
                        if segment.consecutive_failures > 0 {
                            info!(
                                "strip {} segment {}: capture recovered after {} failed grabs",
                                strip.index, segment.index, segment.consecutive_failures
                            );
                            segment.consecutive_failures = 0;
                        }
                        report.captured += 1;
                    }
                    Err(e) => {
                        if segment.consecutive_failures == 0 {
                            warn!(
                                "strip {} segment {}: {e}; keeping last colors",
                                strip.index, segment.index
                            );
                        } else {
                            debug!(
                                "strip {} segment {}: still failing ({} in a row): {e}",
                                strip.index,
                                segment.index,
                                segment.consecutive_failures + 1
                            );
                        }
                        segment.consecutive_failures =
                            segment.consecutive_failures.saturating_add(1);
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    /// Ticks every period until `running` is cleared.
    ///
    /// Capture sessions are destroyed when the loop is dropped.
    pub fn run(&mut self, running: &AtomicBool) {
        info!(
            "capture loop started: {} segments every {:?}",
            self.strips.iter().map(StripCapture::segment_count).sum::<usize>(),
            self.period
        );

        while running.load(Ordering::Relaxed) {
            let started = Instant::now();
            self.tick();
            if let Some(remaining) = self.period.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }

        info!("capture loop stopped");
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        let sessions: usize = self.strips.iter().map(StripCapture::segment_count).sum();
        debug!("destroying {sessions} capture sessions");
    }
}

fn grab_checked(handle: &mut dyn CaptureHandle, expected: usize) -> Result<&[u8], CaptureError> {
    let frame = handle.grab()?;
    if frame.len() != expected {
        return Err(CaptureError::FrameSize {
            expected,
            actual: frame.len(),
        });
    }
    Ok(frame)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
