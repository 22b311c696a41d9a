//! ambientled-host library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the host do?
//!
//! The host runs next to the displays.  It:
//!
//! 1. Loads the strip/segment configuration and validates it into a
//!    [`ambientled_core::Topology`].
//! 2. Opens one capture session per segment and one link per controller,
//!    sending each controller its calibration header (and, for serial
//!    controllers, waiting for the readiness handshake).
//! 3. Runs two loops on dedicated threads: the capture loop at `fps` grabs
//!    every segment and composites it into its strip buffer; the send loop
//!    at `ups` pushes every strip buffer to its controller.
//! 4. On Ctrl-C, stops both loops and turns the LEDs off.

/// Application layer: the two loops, reconnect backoff and pipeline wiring.
pub mod application;

/// Infrastructure layer: capture backends, transports and config storage.
pub mod infrastructure;
