//! Scalar encodings shared by the calibration headers.
//!
//! The network controller has an FPU and receives multipliers as raw
//! IEEE-754 single-precision values in network byte order.  The serial
//! microcontroller has no floating-point budget and receives an 8-bit signed
//! fixed-point value centred on 128:
//!
//! ```text
//! byte    = round(value × 255 − 128)      (saturating to -128..=127)
//! decoded = (byte + 128) / 255
//! ```
//!
//! so `0.0 → -128`, `1.0 → 127`, and everything in between lands within
//! half a step (1/510) of the original.

/// Encodes `value` as a big-endian IEEE-754 `f32`.
pub fn encode_f32_be(value: f32) -> [u8; 4] {
    value.to_bits().to_be_bytes()
}

/// Decodes a big-endian IEEE-754 `f32`.
pub fn decode_f32_be(bytes: [u8; 4]) -> f32 {
    f32::from_bits(u32::from_be_bytes(bytes))
}

/// Quantizes `value` to the 8-bit signed fixed-point format.
///
/// Values outside `[0, 1]` saturate; NaN maps to `0`.
pub fn quantize_fixed_point(value: f32) -> i8 {
    // `as` saturates float-to-int conversions and maps NaN to 0.
    (value * 255.0 - 128.0).round() as i8
}

/// Recovers the approximate value of a fixed-point byte.
pub fn dequantize_fixed_point(byte: i8) -> f32 {
    (f32::from(byte) + 128.0) / 255.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
