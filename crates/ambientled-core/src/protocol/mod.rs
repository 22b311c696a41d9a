//! LED controller wire protocols: scalar encodings, calibration headers and
//! the serial readiness handshake.

pub mod handshake;
pub mod header;
pub mod wire;

pub use handshake::{perform_handshake, ByteSource, HandshakeError, HandshakePolicy};
pub use header::{CalibrationHeader, ProtocolError, NETWORK_HEADER_LEN, SERIAL_HEADER_LEN};
