//! Infrastructure layer for the host.
//!
//! Contains OS-facing adapters: screen capture backends, TCP and serial
//! transports, and configuration file loading.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `ambientled_core`, but MUST NOT be imported by the `application` layer.

pub mod capture;
pub mod storage;
pub mod transport;
