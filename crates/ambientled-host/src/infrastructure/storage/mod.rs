//! Configuration file loading.

pub mod config;
