//! mkvmux - Matroska muxer back end
//!
//! This library crate exposes the driver pieces (configuration, packet
//! scripts, mux runner) for integration testing.

pub mod config;
pub mod mux;
pub mod script;
