//! Error types for mirror synchronization.

use thiserror::Error;

/// Errors that can occur while bootstrapping or syncing a registry.
///
/// None of these are fatal to the process; the supervisor turns each into
/// a retry with the appropriate delay.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Upstream HTTP fetch failed.
    #[error("http error: {0}")]
    Http(String),

    /// Serial body was empty or not a decimal integer.
    #[error("serial error: {0}")]
    Serial(String),

    /// The mirror violated the NRTM protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No line from the mirror within the poll window.
    #[error("mirror idle past the poll window")]
    Idle,

    /// Core parse or snapshot error.
    #[error(transparent)]
    Core(#[from] tinyirr_core::CoreError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
