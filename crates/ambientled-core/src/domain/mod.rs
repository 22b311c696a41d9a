//! Domain entities for AmbientLed.
//!
//! Pure data and byte-shuffling logic with no infrastructure dependencies.
//! Everything here can be compiled and tested without a display or an LED
//! controller attached.

/// Segment-to-strip placement and the compositor copy.
pub mod compositor;

/// Area-averaging reduction of a captured rectangle to one pixel per LED.
pub mod sampling;

/// Mutex-guarded color buffer shared by the capture and send loops.
pub mod strip_buffer;

/// Strips, segments, timing and the validating topology builder.
pub mod topology;
