//! Color buffer shared between the capture loop and the send loop.
//!
//! The capture loop writes segments into the buffer at the capture rate; the
//! send loop copies the whole buffer out at the controller update rate.  A
//! mutex guards the bytes and is held only for the duration of one of those
//! two byte copies, never across a screen grab or a socket write, so a reader
//! can never observe a segment that is half old frame and half new frame.
//!
//! The buffer starts out all zeros, so LEDs not covered by any segment stay
//! dark instead of showing whatever happened to be in memory.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::compositor::{composite, Placement, BYTES_PER_LED};

/// A `3 × N` byte RGB buffer for one strip.
#[derive(Debug)]
pub struct StripBuffer {
    leds: usize,
    bytes: Mutex<Vec<u8>>,
}

impl StripBuffer {
    /// Creates a zero-filled buffer for `leds` LEDs.
    pub fn new(leds: usize) -> Self {
        Self {
            leds,
            bytes: Mutex::new(vec![0; leds * BYTES_PER_LED]),
        }
    }

    /// Returns the number of LEDs the buffer holds.
    pub fn leds(&self) -> usize {
        self.leds
    }

    /// Returns the buffer size in bytes.
    pub fn byte_len(&self) -> usize {
        self.leds * BYTES_PER_LED
    }

    /// Composites one segment frame into the buffer under the lock.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`composite`].
    pub fn write_segment(&self, placement: &Placement, frame: &[u8]) {
        let mut bytes = self.lock();
        composite(&mut bytes, placement, frame);
    }

    /// Copies the whole buffer into `out`, replacing its previous contents.
    ///
    /// `out` is reused between calls so the send loop does not allocate per tick.
    pub fn copy_into(&self, out: &mut Vec<u8>) {
        let bytes = self.lock();
        out.clear();
        out.extend_from_slice(&bytes);
    }

    /// Returns a fresh copy of the buffer.
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Sets every LED to black.
    pub fn clear(&self) {
        self.lock().fill(0);
    }

    // A panic inside `composite` poisons the mutex; the bytes are still a
    // valid buffer so the poison is ignored.
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
