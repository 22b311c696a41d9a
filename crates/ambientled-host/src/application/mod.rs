//! Application layer for the host.
//!
//! Everything here works against traits ([`capture_loop::CaptureService`],
//! [`send_loop::Transport`], [`send_loop::DeviceConnector`]) so the loops can
//! be driven by mocks in tests and by X11 / TCP / serial adapters in
//! production.  No OS calls, sockets or file access live in this layer.
//!
//! - **`capture_loop`** – Grabs every segment at `fps` and composites it into
//!   the strip buffers.
//! - **`send_loop`** – Pushes every strip buffer to its controller at `ups`,
//!   reconnecting failed links.
//! - **`backoff`** – Exponential reconnect delay.
//! - **`pipeline`** – Builds both loops from a topology and runs them on
//!   named threads.

pub mod backoff;
pub mod capture_loop;
pub mod pipeline;
pub mod send_loop;
