//! Error types for mkvmux-core.

use std::io;
use thiserror::Error;

/// Result type for mkvmux-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mkvmux-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the output stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// EBML encoding or decoding error.
    #[error("EBML error: {0}")]
    Ebml(#[from] mkvmux_ebml::Error),

    /// Internal consistency violation (a bug, not a data error).
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Inconsistent mux configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Packet refers to a track that was never registered.
    #[error("Unknown track number {0}")]
    UnknownTrack(u64),

    /// Track number registered twice.
    #[error("Track number {0} registered twice")]
    DuplicateTrack(u64),

    /// Muxing was cancelled through the abort flag.
    #[error("Muxing aborted")]
    Aborted,
}

impl Error {
    /// Create an invariant violation error.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
