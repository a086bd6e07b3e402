//! Error types for mcradio-client

use thiserror::Error;

/// Main error type for mcradio-client
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the shared library (packets, configuration)
    #[error(transparent)]
    Common(#[from] mcradio_common::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Multicast socket setup errors
    #[error("Socket error: {0}")]
    Socket(String),

    /// Decoder process could not be started or fed
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// File or socket I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using mcradio-client Error
pub type Result<T> = std::result::Result<T, Error>;
