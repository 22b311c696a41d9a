//! Calibration headers sent once per connection, before any frame data.
//!
//! Network controller (28 bytes):
//! ```text
//! [max_brightness:4][leds:4][r:f32][g:f32][b:f32][lerp:f32][ups:4]
//! ```
//!
//! Serial controller (16 bytes):
//! ```text
//! [max_brightness:4][leds:4][r:i8][g:i8][b:i8][lerp:i8][ups:4]
//! ```
//!
//! All multi-byte fields are big-endian.  The two layouts are not
//! interchangeable: each controller firmware only understands its own.

use thiserror::Error;

use crate::domain::topology::{DeviceKind, Strip, Timing};
use crate::protocol::wire::{
    decode_f32_be, dequantize_fixed_point, encode_f32_be, quantize_fixed_point,
};

/// Size of the network controller header in bytes.
pub const NETWORK_HEADER_LEN: usize = 28;

/// Size of the serial controller header in bytes.
pub const SERIAL_HEADER_LEN: usize = 16;

/// Errors that can occur while decoding a header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the header.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },
}

/// Calibration parameters for one controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationHeader {
    pub max_brightness: u32,
    pub leds: u32,
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub lerp: f32,
    pub ups: u32,
}

impl CalibrationHeader {
    /// Collects the header fields for `strip` under `timing`.
    pub fn for_strip(strip: &Strip, timing: &Timing) -> Self {
        Self {
            max_brightness: strip.calibration.max_brightness,
            // Topology validation guarantees the count fits.
            leds: u32::try_from(strip.leds).unwrap_or(u32::MAX),
            red: strip.calibration.red,
            green: strip.calibration.green,
            blue: strip.calibration.blue,
            lerp: timing.lerp,
            ups: timing.ups,
        }
    }

    /// Encodes the header in the layout understood by `device`.
    pub fn encode_for(&self, device: &DeviceKind) -> Vec<u8> {
        match device {
            DeviceKind::Network { .. } => self.encode_network().to_vec(),
            DeviceKind::Serial { .. } => self.encode_serial().to_vec(),
        }
    }

    /// Encodes the 28-byte network controller header.
    pub fn encode_network(&self) -> [u8; NETWORK_HEADER_LEN] {
        let mut buf = [0u8; NETWORK_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.max_brightness.to_be_bytes());
        buf[4..8].copy_from_slice(&self.leds.to_be_bytes());
        buf[8..12].copy_from_slice(&encode_f32_be(self.red));
        buf[12..16].copy_from_slice(&encode_f32_be(self.green));
        buf[16..20].copy_from_slice(&encode_f32_be(self.blue));
        buf[20..24].copy_from_slice(&encode_f32_be(self.lerp));
        buf[24..28].copy_from_slice(&self.ups.to_be_bytes());
        buf
    }

    /// Encodes the 16-byte serial controller header.
    pub fn encode_serial(&self) -> [u8; SERIAL_HEADER_LEN] {
        let mut buf = [0u8; SERIAL_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.max_brightness.to_be_bytes());
        buf[4..8].copy_from_slice(&self.leds.to_be_bytes());
        buf[8] = quantize_fixed_point(self.red) as u8;
        buf[9] = quantize_fixed_point(self.green) as u8;
        buf[10] = quantize_fixed_point(self.blue) as u8;
        buf[11] = quantize_fixed_point(self.lerp) as u8;
        buf[12..16].copy_from_slice(&self.ups.to_be_bytes());
        buf
    }

    /// Decodes a network controller header from the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InsufficientData`] if fewer than
    /// [`NETWORK_HEADER_LEN`] bytes are available.
    pub fn decode_network(bytes: &[u8]) -> Result<Self, ProtocolError> {
        require(bytes, NETWORK_HEADER_LEN)?;
        Ok(Self {
            max_brightness: read_u32(bytes, 0),
            leds: read_u32(bytes, 4),
            red: decode_f32_be(read_array(bytes, 8)),
            green: decode_f32_be(read_array(bytes, 12)),
            blue: decode_f32_be(read_array(bytes, 16)),
            lerp: decode_f32_be(read_array(bytes, 20)),
            ups: read_u32(bytes, 24),
        })
    }

    /// Decodes a serial controller header from the start of `bytes`.
    ///
    /// Multipliers and lerp come back quantized to 1/255 steps.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InsufficientData`] if fewer than
    /// [`SERIAL_HEADER_LEN`] bytes are available.
    pub fn decode_serial(bytes: &[u8]) -> Result<Self, ProtocolError> {
        require(bytes, SERIAL_HEADER_LEN)?;
        Ok(Self {
            max_brightness: read_u32(bytes, 0),
            leds: read_u32(bytes, 4),
            red: dequantize_fixed_point(bytes[8] as i8),
            green: dequantize_fixed_point(bytes[9] as i8),
            blue: dequantize_fixed_point(bytes[10] as i8),
            lerp: dequantize_fixed_point(bytes[11] as i8),
            ups: read_u32(bytes, 12),
        })
    }
}

fn require(bytes: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if bytes.len() < needed {
        return Err(ProtocolError::InsufficientData {
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}

fn read_array(bytes: &[u8], at: usize) -> [u8; 4] {
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(read_array(bytes, at))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
