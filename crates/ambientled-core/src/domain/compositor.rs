//! Segment compositor: places one sampled segment into its strip buffer.
//!
//! A strip buffer is `3 × N` bytes, one RGB triplet per LED in physical
//! order.  A segment owns the contiguous LED range
//! `[offset, offset + length)` of that buffer.  The capture backend hands us
//! exactly `length` RGB triplets for the segment, already reduced from the
//! screen rectangle; the compositor only has to copy them into place, either
//! verbatim or in reverse LED order when the segment is flipped.
//!
//! ```text
//! frame (flip = false):  [A][B][C]        strip: .. [A][B][C] ..
//! frame (flip = true):   [A][B][C]        strip: .. [C][B][A] ..
//!                                                  ^ offset
//! ```
//!
//! Flipping reverses LED triplets, never the bytes inside a triplet, so
//! colors are preserved.

use std::ops::Range;

/// Number of bytes per LED in every strip buffer and captured frame (R, G, B).
pub const BYTES_PER_LED: usize = 3;

/// Where a segment lands inside its strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Index of the first LED covered by the segment.
    pub offset: usize,
    /// Number of LEDs covered by the segment.
    pub length: usize,
    /// Write the captured LEDs in reverse order.
    pub flip: bool,
}

impl Placement {
    /// Creates a placement covering `length` LEDs starting at `offset`.
    pub fn new(offset: usize, length: usize, flip: bool) -> Self {
        Self {
            offset,
            length,
            flip,
        }
    }

    /// Returns the LED index one past the last LED of the segment.
    ///
    /// Saturates at `usize::MAX`, so an unvalidated placement reads as out of
    /// range instead of wrapping.
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.length)
    }

    /// Returns the byte range of the strip buffer written by this segment.
    pub fn byte_range(&self) -> Range<usize> {
        self.offset.saturating_mul(BYTES_PER_LED)..self.end().saturating_mul(BYTES_PER_LED)
    }

    /// Returns the number of bytes a captured frame for this segment must have.
    pub fn frame_len(&self) -> usize {
        self.length.saturating_mul(BYTES_PER_LED)
    }

    /// Returns `true` if both placements cover at least one common LED.
    pub fn overlaps(&self, other: &Placement) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Copies `frame` into the LED range of `strip_buffer` described by `placement`.
///
/// Only bytes in [`Placement::byte_range`] are written; the rest of the strip
/// buffer is left untouched.  The buffer is never resized.
///
/// # Panics
///
/// Panics if `frame.len() != placement.frame_len()` or if the placement
/// extends past the end of `strip_buffer`.  Both indicate a capture/topology
/// mismatch that validation should have rejected long before a frame arrives.
pub fn composite(strip_buffer: &mut [u8], placement: &Placement, frame: &[u8]) {
    assert_eq!(
        frame.len(),
        placement.frame_len(),
        "frame for LEDs {}..{} must be {} bytes",
        placement.offset,
        placement.end(),
        placement.frame_len()
    );
    let range = placement.byte_range();
    assert!(
        range.end <= strip_buffer.len(),
        "LEDs {}..{} exceed strip buffer of {} bytes",
        placement.offset,
        placement.end(),
        strip_buffer.len()
    );

    let dst = &mut strip_buffer[range];
    if placement.flip {
        for (src_led, dst_led) in frame
            .chunks_exact(BYTES_PER_LED)
            .zip(dst.chunks_exact_mut(BYTES_PER_LED).rev())
        {
            dst_led.copy_from_slice(src_led);
        }
    } else {
        dst.copy_from_slice(frame);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_for(length: usize, seed: u8) -> Vec<u8> {
        (0..length * BYTES_PER_LED)
            .map(|i| seed.wrapping_add(i as u8))
            .collect()
    }

    #[test]
    fn test_placement_end_saturates_instead_of_wrapping() {
        let placement = Placement::new(usize::MAX, 2, false);

        assert_eq!(placement.end(), usize::MAX);
        assert_eq!(placement.byte_range().end, usize::MAX);
        assert!(placement.overlaps(&Placement::new(usize::MAX - 1, 1, false)));
    }

    #[test]
    #[should_panic(expected = "exceed strip buffer")]
    fn test_composite_rejects_placement_with_huge_offset() {
        let mut buffer = vec![0u8; 10 * BYTES_PER_LED];

        composite(&mut buffer, &Placement::new(usize::MAX, 1, false), &[1, 2, 3]);
    }

    #[test]
    fn test_composite_writes_exactly_the_segment_range() {
        // Arrange
        let leds = 10;
        let placement = Placement::new(3, 4, false);
        let mut buffer = vec![0xEEu8; leds * BYTES_PER_LED];
        let frame = frame_for(4, 1);

        // Act
        composite(&mut buffer, &placement, &frame);

        // Assert
        let range = placement.byte_range();
        for (i, byte) in buffer.iter().enumerate() {
            if range.contains(&i) {
                assert_eq!(*byte, frame[i - range.start], "byte {i} must come from the frame");
            } else {
                assert_eq!(*byte, 0xEE, "byte {i} outside the segment must be untouched");
            }
        }
    }

    #[test]
    fn test_composite_flip_leaves_outside_bytes_untouched() {
        // Arrange
        let placement = Placement::new(1, 2, true);
        let mut buffer = vec![0xAAu8; 4 * BYTES_PER_LED];

        // Act
        composite(&mut buffer, &placement, &frame_for(2, 50));

        // Assert
        assert_eq!(&buffer[..3], &[0xAA; 3]);
        assert_eq!(&buffer[9..], &[0xAA; 3]);
    }

    #[test]
    fn test_composite_flip_reverses_led_triplets() {
        // Arrange
        let frame = frame_for(5, 7);
        let straight = Placement::new(2, 5, false);
        let flipped = Placement { flip: true, ..straight };
        let mut a = vec![0u8; 8 * BYTES_PER_LED];
        let mut b = vec![0u8; 8 * BYTES_PER_LED];

        // Act
        composite(&mut a, &straight, &frame);
        composite(&mut b, &flipped, &frame);

        // Assert – b's segment must be a's segment with LED order reversed.
        let range = straight.byte_range();
        let reversed: Vec<u8> = a[range.clone()]
            .chunks_exact(BYTES_PER_LED)
            .rev()
            .flatten()
            .copied()
            .collect();
        assert_eq!(&b[range], reversed.as_slice());
    }

    #[test]
    fn test_composite_two_segments_fill_three_led_strip() {
        // Arrange
        let mut buffer = vec![0u8; 9];
        let first = Placement::new(0, 2, false);
        let second = Placement::new(2, 1, false);

        // Act
        composite(&mut buffer, &first, &[10, 20, 30, 40, 50, 60]);
        composite(&mut buffer, &second, &[70, 80, 90]);

        // Assert
        assert_eq!(buffer, vec![10, 20, 30, 40, 50, 60, 70, 80, 90]);
    }

    #[test]
    fn test_composite_flipped_first_segment_reverses_its_two_leds() {
        let mut buffer = vec![0u8; 9];

        composite(&mut buffer, &Placement::new(0, 2, true), &[10, 20, 30, 40, 50, 60]);
        composite(&mut buffer, &Placement::new(2, 1, false), &[70, 80, 90]);

        assert_eq!(buffer, vec![40, 50, 60, 10, 20, 30, 70, 80, 90]);
    }

    #[test]
    fn test_composite_single_led_flip_is_identity() {
        let mut a = vec![0u8; 3];
        let mut b = vec![0u8; 3];

        composite(&mut a, &Placement::new(0, 1, false), &[1, 2, 3]);
        composite(&mut b, &Placement::new(0, 1, true), &[1, 2, 3]);

        assert_eq!(a, b);
    }

    #[test]
    #[should_panic(expected = "must be 6 bytes")]
    fn test_composite_panics_on_short_frame() {
        let mut buffer = vec![0u8; 9];
        composite(&mut buffer, &Placement::new(0, 2, false), &[1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "exceed strip buffer")]
    fn test_composite_panics_when_segment_exceeds_buffer() {
        let mut buffer = vec![0u8; 6];
        composite(&mut buffer, &Placement::new(1, 2, false), &[0; 6]);
    }

    #[test]
    fn test_placement_overlap_detection() {
        let a = Placement::new(0, 5, false);

        assert!(a.overlaps(&Placement::new(4, 2, false)));
        assert!(!a.overlaps(&Placement::new(5, 2, false)), "adjacent ranges do not overlap");
        assert!(Placement::new(2, 1, true).overlaps(&a));
    }

    #[test]
    fn test_placement_byte_range_is_three_bytes_per_led() {
        let p = Placement::new(4, 3, false);

        assert_eq!(p.byte_range(), 12..21);
        assert_eq!(p.frame_len(), 9);
        assert_eq!(p.end(), 7);
    }
}
