//! # ambientled-core
//!
//! Shared library for AmbientLed containing the strip topology model, the
//! segment compositor, the software pixel sampler, and the two LED controller
//! wire protocols.
//!
//! This crate has zero dependencies on OS APIs, capture drivers, or sockets.
//! The host application wires it to real screens and real controllers.
//!
//! # Architecture overview
//!
//! AmbientLed drives LED strips mounted behind a monitor so that they mirror
//! the colors at the screen edges.  Each physical strip is split into
//! *segments*, and every segment watches one rectangle of one display.
//!
//! - **`domain`** – The topology (strips, segments, timing), the shared
//!   per-strip color buffer, the compositor that places a sampled segment into
//!   its strip buffer, and the area-averaging sampler used by software capture
//!   backends.
//!
//! - **`protocol`** – How bytes reach a controller.  The network controller
//!   receives a 28-byte calibration header with IEEE-754 multipliers; the
//!   serial microcontroller receives a 16-byte header with 8-bit fixed-point
//!   multipliers and must acknowledge it with a handshake byte.

pub mod domain;
pub mod protocol;

pub use domain::compositor::{composite, Placement, BYTES_PER_LED};
pub use domain::sampling::{average_into, ImageView, PixelFormat, SamplingError};
pub use domain::strip_buffer::StripBuffer;
pub use domain::topology::{
    CaptureRect, Calibration, DeviceKind, InvalidOrientation, Orientation, Segment, Strip, Timing,
    Topology, TopologyError, DEFAULT_SERIAL_BAUD_RATE,
};
pub use protocol::handshake::{perform_handshake, ByteSource, HandshakeError, HandshakePolicy};
pub use protocol::header::{
    CalibrationHeader, ProtocolError, NETWORK_HEADER_LEN, SERIAL_HEADER_LEN,
};
