//! Error types for mcradio-server
//!
//! Defines server-specific error types using thiserror. Library and packet
//! errors from `mcradio-common` are wrapped rather than flattened.

use thiserror::Error;

/// Main error type for mcradio-server
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the shared library (media library, packets, pool)
    #[error(transparent)]
    Common(#[from] mcradio_common::Error),

    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Multicast socket setup errors
    #[error("Socket error: {0}")]
    Socket(String),

    /// File or socket I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using mcradio-server Error
pub type Result<T> = std::result::Result<T, Error>;
