//! Error types shared between client and server.
//!
//! The `MarketError` enum unifies common failure cases for I/O, serialization and
//! request or simulation input validation, allowing crates to propagate a single
//! error type.
use std::io;

use thiserror::Error;

/// Unified error type shared by client and server.
#[derive(Error, Debug)]
pub enum MarketError {
    /// I/O error originating from the standard library or sockets/files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// A convergence window must span at least one tick.
    #[error("Invalid convergence window: {0} ticks")]
    InvalidWindow(u32),

    /// Request header not understood by the server.
    #[error("Unknown request: {0}")]
    UnknownRequest(String),
}
