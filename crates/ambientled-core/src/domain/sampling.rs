//! Area-averaging reduction of a captured rectangle to one color per LED.
//!
//! GPU capture services can scale a rectangle down to `length × 1` pixels
//! themselves.  Software capture backends (X11 `XGetImage`, test fixtures)
//! hand back the full-resolution rectangle instead, and this module reduces
//! it: the rectangle is cut into `leds` equal slices along the segment's
//! orientation and each slice is averaged into one RGB triplet.
//!
//! ```text
//! Horizontal, 4 LEDs:            Vertical, 3 LEDs:
//! +----+----+----+----+          +-----------+
//! | 0  | 1  | 2  | 3  |          |     0     |
//! +----+----+----+----+          +-----------+
//!                                |     1     |
//!                                +-----------+
//!                                |     2     |
//!                                +-----------+
//! ```
//!
//! Averaging every pixel of a 1920-wide band is wasteful for an LED, so a
//! `step` lets callers sample every n-th pixel in both directions.

use thiserror::Error;

use crate::domain::compositor::BYTES_PER_LED;
use crate::domain::topology::Orientation;

/// Errors raised when wrapping raw capture memory in an [`ImageView`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SamplingError {
    /// The image has zero width or height.
    #[error("image must be at least 1x1 pixels")]
    EmptyImage,

    /// A row is shorter than `width` pixels.
    #[error("row stride {stride} is smaller than {row} bytes of pixels")]
    StrideTooSmall { stride: usize, row: usize },

    /// The backing memory cannot hold the described image.
    #[error("image needs {needed} bytes, buffer has {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Byte layout of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bytes_per_pixel: usize,
    /// Byte index of the red channel within a pixel.
    pub red: usize,
    pub green: usize,
    pub blue: usize,
}

impl PixelFormat {
    /// Packed 24-bit RGB.
    pub const RGB24: PixelFormat = PixelFormat {
        bytes_per_pixel: 3,
        red: 0,
        green: 1,
        blue: 2,
    };

    /// 32-bit pixel stored as B, G, R, X (X11 `ZPixmap` on little-endian
    /// hosts with a `0xFF0000` red mask).
    pub const BGRX32: PixelFormat = PixelFormat {
        bytes_per_pixel: 4,
        red: 2,
        green: 1,
        blue: 0,
    };

    /// 32-bit pixel stored as R, G, B, X.
    pub const RGBX32: PixelFormat = PixelFormat {
        bytes_per_pixel: 4,
        red: 0,
        green: 1,
        blue: 2,
    };
}

/// Borrowed view of a row-major image.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
    format: PixelFormat,
}

impl<'a> ImageView<'a> {
    /// Wraps `data` as a `width × height` image whose rows start `stride`
    /// bytes apart.
    ///
    /// # Errors
    ///
    /// Returns [`SamplingError`] if the dimensions are empty or `data` is too
    /// small for them.
    pub fn new(
        data: &'a [u8],
        width: usize,
        height: usize,
        stride: usize,
        format: PixelFormat,
    ) -> Result<Self, SamplingError> {
        if width == 0 || height == 0 {
            return Err(SamplingError::EmptyImage);
        }
        let row = width * format.bytes_per_pixel;
        if stride < row {
            return Err(SamplingError::StrideTooSmall { stride, row });
        }
        let needed = stride * (height - 1) + row;
        if data.len() < needed {
            return Err(SamplingError::BufferTooSmall {
                needed,
                available: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
            format,
        })
    }

    /// Wraps tightly packed pixels (`stride == width × bytes_per_pixel`).
    ///
    /// # Errors
    ///
    /// Same as [`ImageView::new`].
    pub fn packed(
        data: &'a [u8],
        width: usize,
        height: usize,
        format: PixelFormat,
    ) -> Result<Self, SamplingError> {
        Self::new(data, width, height, width * format.bytes_per_pixel, format)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let base = y * self.stride + x * self.format.bytes_per_pixel;
        [
            self.data[base + self.format.red],
            self.data[base + self.format.green],
            self.data[base + self.format.blue],
        ]
    }

    fn average(&self, xs: (usize, usize), ys: (usize, usize), step: usize) -> [u8; 3] {
        let mut sum = [0u64; 3];
        let mut count = 0u64;
        for y in (ys.0..ys.1).step_by(step) {
            for x in (xs.0..xs.1).step_by(step) {
                let [r, g, b] = self.pixel(x, y);
                sum[0] += u64::from(r);
                sum[1] += u64::from(g);
                sum[2] += u64::from(b);
                count += 1;
            }
        }
        // Slices are never empty, so count >= 1.
        let count = count.max(1);
        [
            (sum[0] / count) as u8,
            (sum[1] / count) as u8,
            (sum[2] / count) as u8,
        ]
    }
}

/// Returns the pixel span `[start, end)` covered by LED `index` of `leds`
/// along an axis of `len` pixels.  Every LED gets at least one pixel.
fn slice_bounds(index: usize, leds: usize, len: usize) -> (usize, usize) {
    let start = index * len / leds;
    let end = ((index + 1) * len / leds).max(start + 1).min(len);
    (start, end)
}

/// Reduces `image` to `leds` RGB triplets along `orientation`, writing them
/// to `out` (previous contents are discarded).
///
/// Horizontal segments are sliced left to right, vertical ones top to
/// bottom.  `step` is the sampling stride in pixels; `0` is treated as `1`.
pub fn average_into(
    image: &ImageView<'_>,
    orientation: Orientation,
    leds: usize,
    step: usize,
    out: &mut Vec<u8>,
) {
    let step = step.max(1);
    out.clear();
    out.reserve(leds * BYTES_PER_LED);
    for index in 0..leds {
        let color = match orientation {
            Orientation::Horizontal => image.average(
                slice_bounds(index, leds, image.width),
                (0, image.height),
                step,
            ),
            Orientation::Vertical => image.average(
                (0, image.width),
                slice_bounds(index, leds, image.height),
                step,
            ),
        };
        out.extend_from_slice(&color);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a packed RGB24 image from a closure over (x, y).
    fn rgb_image(width: usize, height: usize, f: impl Fn(usize, usize) -> [u8; 3]) -> Vec<u8> {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        data
    }

    #[test]
    fn test_horizontal_slices_average_columns() {
        // Arrange – left half red, right half blue, 4x2 pixels.
        let data = rgb_image(4, 2, |x, _| if x < 2 { [200, 0, 0] } else { [0, 0, 100] });
        let image = ImageView::packed(&data, 4, 2, PixelFormat::RGB24).unwrap();
        let mut out = Vec::new();

        // Act
        average_into(&image, Orientation::Horizontal, 2, 1, &mut out);

        // Assert
        assert_eq!(out, vec![200, 0, 0, 0, 0, 100]);
    }

    #[test]
    fn test_vertical_slices_average_rows() {
        // Arrange – rows 0..3 get green 30, 60, 90.
        let data = rgb_image(2, 3, |_, y| [0, 30 * (y as u8 + 1), 0]);
        let image = ImageView::packed(&data, 2, 3, PixelFormat::RGB24).unwrap();
        let mut out = Vec::new();

        // Act
        average_into(&image, Orientation::Vertical, 3, 1, &mut out);

        // Assert
        assert_eq!(out, vec![0, 30, 0, 0, 60, 0, 0, 90, 0]);
    }

    #[test]
    fn test_single_led_averages_whole_rectangle() {
        let data = rgb_image(2, 2, |x, y| [(x * 100 + y * 50) as u8, 10, 20]);
        let image = ImageView::packed(&data, 2, 2, PixelFormat::RGB24).unwrap();
        let mut out = Vec::new();

        average_into(&image, Orientation::Horizontal, 1, 1, &mut out);

        // (0 + 100 + 50 + 150) / 4 = 75
        assert_eq!(out, vec![75, 10, 20]);
    }

    #[test]
    fn test_more_leds_than_pixels_gives_each_led_a_pixel() {
        let data = rgb_image(2, 1, |x, _| if x == 0 { [10, 10, 10] } else { [90, 90, 90] });
        let image = ImageView::packed(&data, 2, 1, PixelFormat::RGB24).unwrap();
        let mut out = Vec::new();

        average_into(&image, Orientation::Horizontal, 4, 1, &mut out);

        assert_eq!(out.len(), 12);
        assert_eq!(&out[..3], &[10, 10, 10]);
        assert_eq!(&out[9..], &[90, 90, 90]);
    }

    #[test]
    fn test_step_skips_pixels() {
        // Arrange – odd columns are white, even columns black.
        let data = rgb_image(4, 1, |x, _| if x % 2 == 1 { [255; 3] } else { [0; 3] });
        let image = ImageView::packed(&data, 4, 1, PixelFormat::RGB24).unwrap();
        let mut out = Vec::new();

        // Act – step 2 only visits columns 0 and 2.
        average_into(&image, Orientation::Horizontal, 1, 2, &mut out);

        // Assert
        assert_eq!(out, vec![0, 0, 0]);
    }

    #[test]
    fn test_bgrx_pixels_are_reordered_to_rgb() {
        let data = [30u8, 20, 10, 0xFF];
        let image = ImageView::packed(&data, 1, 1, PixelFormat::BGRX32).unwrap();
        let mut out = Vec::new();

        average_into(&image, Orientation::Vertical, 1, 1, &mut out);

        assert_eq!(out, vec![10, 20, 30]);
    }

    #[test]
    fn test_padded_stride_is_respected() {
        // Arrange – 1 pixel per row, 2 bytes of padding after each row.
        let data = [1u8, 2, 3, 0, 0, 7, 8, 9];
        let image = ImageView::new(&data, 1, 2, 5, PixelFormat::RGB24).unwrap();
        let mut out = Vec::new();

        // Act
        average_into(&image, Orientation::Vertical, 2, 1, &mut out);

        // Assert
        assert_eq!(out, vec![1, 2, 3, 7, 8, 9]);
    }

    #[test]
    fn test_image_view_rejects_short_buffer() {
        let err = ImageView::packed(&[0u8; 5], 2, 1, PixelFormat::RGB24).unwrap_err();

        assert_eq!(
            err,
            SamplingError::BufferTooSmall {
                needed: 6,
                available: 5
            }
        );
    }

    #[test]
    fn test_image_view_rejects_empty_and_narrow_stride() {
        assert_eq!(
            ImageView::packed(&[], 0, 1, PixelFormat::RGB24).unwrap_err(),
            SamplingError::EmptyImage
        );
        assert_eq!(
            ImageView::new(&[0u8; 12], 2, 2, 4, PixelFormat::RGB24).unwrap_err(),
            SamplingError::StrideTooSmall { stride: 4, row: 6 }
        );
    }

    #[test]
    fn test_slice_bounds_cover_axis_without_gaps() {
        let leds = 7;
        let len = 100;
        let mut expected_start = 0;
        for i in 0..leds {
            let (start, end) = slice_bounds(i, leds, len);
            assert_eq!(start, expected_start);
            assert!(end > start);
            expected_start = end;
        }
        assert_eq!(expected_start, len);
    }
}
