//! Strip topology domain entity.
//!
//! The topology is the validated shape of the whole installation: which
//! controllers exist, how many LEDs each one drives, and which screen
//! rectangle feeds which LED range.  It is built once at startup and never
//! changes shape afterwards; only the strip color buffers (see
//! [`crate::StripBuffer`]) change while the loops run.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::compositor::{Placement, BYTES_PER_LED};

/// Baud rate used for the serial microcontroller when none is configured.
pub const DEFAULT_SERIAL_BAUD_RATE: u32 = 981_600;

/// Errors that can occur when validating a topology.
#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    /// A loop rate is zero, which would mean an infinite period.
    #[error("{field} must be greater than zero")]
    ZeroRate { field: &'static str },

    /// The lerp factor is NaN or infinite.
    #[error("lerp factor must be a finite number, got {0}")]
    InvalidLerp(f32),

    /// The topology contains no strips at all.
    #[error("no strips configured")]
    NoStrips,

    /// The LED count is zero or does not fit the 32-bit header field.
    #[error("strip {strip}: invalid LED count {leds}")]
    InvalidLedCount { strip: usize, leds: usize },

    /// The controller address or serial path is empty.
    #[error("strip {strip}: address must not be empty")]
    EmptyAddress { strip: usize },

    /// A color multiplier is NaN or infinite.
    #[error("strip {strip}: {channel} multiplier must be a finite number, got {value}")]
    InvalidMultiplier {
        strip: usize,
        channel: &'static str,
        value: f32,
    },

    /// A segment covers zero LEDs.
    #[error("strip {strip} segment {segment}: length must be greater than zero")]
    EmptySegment { strip: usize, segment: usize },

    /// A segment extends past the last LED of its strip.
    #[error("strip {strip} segment {segment}: LEDs {offset}..{end} exceed strip length {leds}")]
    SegmentOutOfRange {
        strip: usize,
        segment: usize,
        offset: usize,
        end: usize,
        leds: usize,
    },

    /// Two segments of the same strip share at least one LED.
    #[error("strip {strip}: segment {second} overlaps segment {first}")]
    SegmentOverlap {
        strip: usize,
        first: usize,
        second: usize,
    },

    /// The capture rectangle has zero width or height.
    #[error("strip {strip} segment {segment}: capture area must be at least 1x1 pixels")]
    EmptyCaptureArea { strip: usize, segment: usize },
}

/// Raised when an orientation number is neither 0 nor 1.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid orientation {0}: expected 0 (vertical) or 1 (horizontal)")]
pub struct InvalidOrientation(pub u8);

/// Direction along which a segment's rectangle is reduced to one pixel per LED.
///
/// On the wire (configuration files) this is the integer `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Orientation {
    /// LEDs run top to bottom; the rectangle becomes `1 × length` pixels.
    Vertical = 0,
    /// LEDs run left to right; the rectangle becomes `length × 1` pixels.
    Horizontal = 1,
}

impl Orientation {
    /// Returns the `(width, height)` of the reduced image for `leds` LEDs.
    pub fn output_size(self, leds: usize) -> (usize, usize) {
        match self {
            Orientation::Horizontal => (leds, 1),
            Orientation::Vertical => (1, leds),
        }
    }
}

impl TryFrom<u8> for Orientation {
    type Error = InvalidOrientation;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Orientation::Vertical),
            1 => Ok(Orientation::Horizontal),
            other => Err(InvalidOrientation(other)),
        }
    }
}

impl From<Orientation> for u8 {
    fn from(value: Orientation) -> Self {
        value as u8
    }
}

/// A rectangle in screen pixels, relative to the top-left of its display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How the host reaches a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    /// Network controller (Raspberry Pi) reached over TCP.
    Network { host: String, port: u16 },
    /// Microcontroller (Arduino) reached over a serial line.
    Serial { path: String, baud_rate: u32 },
}

impl DeviceKind {
    /// Returns the configuration name of this controller type.
    pub fn type_name(&self) -> &'static str {
        match self {
            DeviceKind::Network { .. } => "rpi",
            DeviceKind::Serial { .. } => "arduino",
        }
    }

    fn address(&self) -> &str {
        match self {
            DeviceKind::Network { host, .. } => host,
            DeviceKind::Serial { path, .. } => path,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Network { host, port } => write!(f, "{host}:{port}"),
            DeviceKind::Serial { path, baud_rate } => write!(f, "{path}@{baud_rate}"),
        }
    }
}

/// Per-strip color calibration forwarded to the controller in its header.
///
/// The controller applies these values; the host never scales colors itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Device-side brightness clamp.
    pub max_brightness: u32,
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

/// One screen rectangle mapped onto a contiguous LED range of a strip.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub placement: Placement,
    /// Identifier of the display the rectangle belongs to.
    pub display: String,
    pub rect: CaptureRect,
    pub orientation: Orientation,
}

impl Segment {
    /// Returns the `(width, height)` the capture backend must reduce the
    /// rectangle to.
    pub fn output_size(&self) -> (usize, usize) {
        self.orientation.output_size(self.placement.length)
    }
}

/// One physical LED controller and the segments feeding it.
#[derive(Debug, Clone, PartialEq)]
pub struct Strip {
    pub device: DeviceKind,
    pub leds: usize,
    pub calibration: Calibration,
    pub segments: Vec<Segment>,
}

impl Strip {
    /// Returns the size in bytes of this strip's color buffer (`3 × leds`).
    pub fn buffer_len(&self) -> usize {
        self.leds * BYTES_PER_LED
    }

    fn validate(&self, strip: usize) -> Result<(), TopologyError> {
        if self.leds == 0 || u32::try_from(self.leds).is_err() {
            return Err(TopologyError::InvalidLedCount {
                strip,
                leds: self.leds,
            });
        }
        if self.device.address().trim().is_empty() {
            return Err(TopologyError::EmptyAddress { strip });
        }
        for (channel, value) in [
            ("red", self.calibration.red),
            ("green", self.calibration.green),
            ("blue", self.calibration.blue),
        ] {
            if !value.is_finite() {
                return Err(TopologyError::InvalidMultiplier {
                    strip,
                    channel,
                    value,
                });
            }
        }

        for (index, segment) in self.segments.iter().enumerate() {
            let placement = &segment.placement;
            if placement.length == 0 {
                return Err(TopologyError::EmptySegment {
                    strip,
                    segment: index,
                });
            }
            let fits = placement
                .offset
                .checked_add(placement.length)
                .is_some_and(|end| end <= self.leds);
            if !fits {
                return Err(TopologyError::SegmentOutOfRange {
                    strip,
                    segment: index,
                    offset: placement.offset,
                    end: placement.end(),
                    leds: self.leds,
                });
            }
            if segment.rect.width == 0 || segment.rect.height == 0 {
                return Err(TopologyError::EmptyCaptureArea {
                    strip,
                    segment: index,
                });
            }
            if let Some(first) = self.segments[..index]
                .iter()
                .position(|earlier| earlier.placement.overlaps(placement))
            {
                return Err(TopologyError::SegmentOverlap {
                    strip,
                    first,
                    second: index,
                });
            }
        }
        Ok(())
    }
}

/// Loop cadences and the interpolation factor shared by every controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Capture samples per second.
    pub fps: u32,
    /// Controller updates per second.
    pub ups: u32,
    /// Device-side temporal interpolation coefficient.
    pub lerp: f32,
}

impl Timing {
    /// Returns the capture loop period (`1 / fps`).
    pub fn capture_period(&self) -> Duration {
        period_for(self.fps)
    }

    /// Returns the send loop period (`1 / ups`).
    pub fn send_period(&self) -> Duration {
        period_for(self.ups)
    }
}

fn period_for(rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(rate.max(1)))
}

/// The validated root of the installation.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    timing: Timing,
    strips: Vec<Strip>,
}

impl Topology {
    /// Validates `strips` and `timing` and builds the topology.
    ///
    /// # Errors
    ///
    /// Returns the first [`TopologyError`] found, checking timing first and
    /// then strips and their segments in declared order.
    pub fn new(timing: Timing, strips: Vec<Strip>) -> Result<Self, TopologyError> {
        if timing.fps == 0 {
            return Err(TopologyError::ZeroRate { field: "fps" });
        }
        if timing.ups == 0 {
            return Err(TopologyError::ZeroRate { field: "ups" });
        }
        if !timing.lerp.is_finite() {
            return Err(TopologyError::InvalidLerp(timing.lerp));
        }
        if strips.is_empty() {
            return Err(TopologyError::NoStrips);
        }
        for (index, strip) in strips.iter().enumerate() {
            strip.validate(index)?;
        }
        Ok(Self { timing, strips })
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn strips(&self) -> &[Strip] {
        &self.strips
    }

    /// Returns the total number of segments across all strips.
    pub fn segment_count(&self) -> usize {
        self.strips.iter().map(|s| s.segments.len()).sum()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(offset: usize, length: usize) -> Segment {
        Segment {
            placement: Placement::new(offset, length, false),
            display: "DP-0".to_string(),
            rect: CaptureRect {
                x: 0,
                y: 0,
                width: 1920,
                height: 40,
            },
            orientation: Orientation::Horizontal,
        }
    }

    fn strip(leds: usize, segments: Vec<Segment>) -> Strip {
        Strip {
            device: DeviceKind::Network {
                host: "192.168.1.20".to_string(),
                port: 5163,
            },
            leds,
            calibration: Calibration {
                max_brightness: 500,
                red: 1.0,
                green: 0.9,
                blue: 0.8,
            },
            segments,
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
    fn test_valid_topology_is_accepted() {
        // Arrange
        let strips = vec![strip(10, vec![segment(0, 4), segment(4, 6)])];

        // Act
        let topology = Topology::new(timing(), strips).expect("valid");

        // Assert
        assert_eq!(topology.strips().len(), 1);
        assert_eq!(topology.segment_count(), 2);
        assert_eq!(topology.strips()[0].buffer_len(), 30);
    }

    #[test]
    fn test_zero_fps_is_rejected() {
        let t = Timing { fps: 0, ..timing() };

        let err = Topology::new(t, vec![strip(3, vec![])]).unwrap_err();

        assert_eq!(err, TopologyError::ZeroRate { field: "fps" });
    }

    #[test]
    fn test_zero_ups_is_rejected() {
        let t = Timing { ups: 0, ..timing() };

        let err = Topology::new(t, vec![strip(3, vec![])]).unwrap_err();

        assert_eq!(err, TopologyError::ZeroRate { field: "ups" });
    }

    #[test]
    fn test_nan_lerp_is_rejected() {
        let t = Timing {
            lerp: f32::NAN,
            ..timing()
        };

        let err = Topology::new(t, vec![strip(3, vec![])]).unwrap_err();

        assert!(matches!(err, TopologyError::InvalidLerp(_)));
    }

    #[test]
    fn test_empty_strip_list_is_rejected() {
        assert_eq!(
            Topology::new(timing(), vec![]).unwrap_err(),
            TopologyError::NoStrips
        );
    }

    #[test]
    fn test_segment_past_end_of_strip_is_rejected() {
        // Arrange – offset 8 + length 3 = 11 > 10 LEDs
        let strips = vec![strip(10, vec![segment(8, 3)])];

        // Act
        let err = Topology::new(timing(), strips).unwrap_err();

        // Assert
        assert_eq!(
            err,
            TopologyError::SegmentOutOfRange {
                strip: 0,
                segment: 0,
                offset: 8,
                end: 11,
                leds: 10
            }
        );
    }

    #[test]
    fn test_segment_offset_near_usize_max_is_out_of_range() {
        // Arrange – offset + length does not fit in usize
        let strips = vec![strip(10, vec![segment(usize::MAX, 2)])];

        // Act
        let err = Topology::new(timing(), strips).unwrap_err();

        // Assert
        assert_eq!(
            err,
            TopologyError::SegmentOutOfRange {
                strip: 0,
                segment: 0,
                offset: usize::MAX,
                end: usize::MAX,
                leds: 10
            }
        );
    }

    #[test]
    fn test_segment_length_near_usize_max_is_out_of_range() {
        let strips = vec![strip(10, vec![segment(3, usize::MAX)])];

        assert!(matches!(
            Topology::new(timing(), strips),
            Err(TopologyError::SegmentOutOfRange { offset: 3, .. })
        ));
    }

    #[test]
    fn test_segment_ending_exactly_at_strip_end_is_accepted() {
        let strips = vec![strip(10, vec![segment(7, 3)])];

        assert!(Topology::new(timing(), strips).is_ok());
    }

    #[test]
    fn test_overlapping_segments_are_rejected() {
        let strips = vec![strip(10, vec![segment(0, 5), segment(6, 2), segment(4, 2)])];

        let err = Topology::new(timing(), strips).unwrap_err();

        assert_eq!(
            err,
            TopologyError::SegmentOverlap {
                strip: 0,
                first: 0,
                second: 2
            }
        );
    }

    #[test]
    fn test_zero_length_segment_is_rejected() {
        let strips = vec![strip(10, vec![segment(2, 0)])];

        assert_eq!(
            Topology::new(timing(), strips).unwrap_err(),
            TopologyError::EmptySegment {
                strip: 0,
                segment: 0
            }
        );
    }

    #[test]
    fn test_zero_leds_is_rejected() {
        let err = Topology::new(timing(), vec![strip(0, vec![])]).unwrap_err();

        assert_eq!(err, TopologyError::InvalidLedCount { strip: 0, leds: 0 });
    }

    #[test]
    fn test_empty_capture_area_is_rejected() {
        let mut seg = segment(0, 2);
        seg.rect.height = 0;

        let err = Topology::new(timing(), vec![strip(4, vec![seg])]).unwrap_err();

        assert_eq!(
            err,
            TopologyError::EmptyCaptureArea {
                strip: 0,
                segment: 0
            }
        );
    }

    #[test]
    fn test_infinite_multiplier_is_rejected() {
        let mut s = strip(4, vec![]);
        s.calibration.green = f32::INFINITY;

        let err = Topology::new(timing(), vec![s]).unwrap_err();

        assert!(matches!(
            err,
            TopologyError::InvalidMultiplier {
                channel: "green",
                ..
            }
        ));
    }

    #[test]
    fn test_blank_address_is_rejected() {
        let mut s = strip(4, vec![]);
        s.device = DeviceKind::Serial {
            path: "  ".to_string(),
            baud_rate: DEFAULT_SERIAL_BAUD_RATE,
        };

        assert_eq!(
            Topology::new(timing(), vec![s]).unwrap_err(),
            TopologyError::EmptyAddress { strip: 0 }
        );
    }

    #[test]
    fn test_orientation_output_size() {
        assert_eq!(Orientation::Horizontal.output_size(12), (12, 1));
        assert_eq!(Orientation::Vertical.output_size(12), (1, 12));
    }

    #[test]
    fn test_orientation_from_wire_integer() {
        assert_eq!(Orientation::try_from(0).unwrap(), Orientation::Vertical);
        assert_eq!(Orientation::try_from(1).unwrap(), Orientation::Horizontal);
        assert_eq!(Orientation::try_from(2).unwrap_err(), InvalidOrientation(2));
        assert_eq!(u8::from(Orientation::Horizontal), 1);
    }

    #[test]
    fn test_timing_periods() {
        let t = timing();

        assert_eq!(t.capture_period(), Duration::from_micros(33_333));
        assert_eq!(t.send_period(), Duration::from_micros(16_666));
    }

    #[test]
    fn test_device_kind_display() {
        let net = DeviceKind::Network {
            host: "10.0.0.2".to_string(),
            port: 5163,
        };
        let serial = DeviceKind::Serial {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 981_600,
        };

        assert_eq!(net.to_string(), "10.0.0.2:5163");
        assert_eq!(serial.to_string(), "/dev/ttyUSB0@981600");
        assert_eq!(net.type_name(), "rpi");
        assert_eq!(serial.type_name(), "arduino");
    }
}
