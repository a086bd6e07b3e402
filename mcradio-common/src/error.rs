//! Common error types for mcradio

use std::path::PathBuf;
use thiserror::Error;

use crate::ChannelId;

/// Common result type for mcradio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the server and the client
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Media library root does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Media library root exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Library scan finished without a single playable channel
    #[error("No valid channels found under {0}")]
    NoChannels(PathBuf),

    /// Requested channel id is not part of the library
    #[error("Channel {0} not found")]
    ChannelNotFound(ChannelId),

    /// Channel exists but has no audio files to read
    #[error("Channel {0} has no audio files")]
    ChannelEmpty(ChannelId),

    /// Datagram shorter than a packet header
    #[error("Truncated packet: {len} bytes, header needs {needed}")]
    TruncatedPacket { len: usize, needed: usize },

    /// Header payload length disagrees with the bytes that follow it
    #[error("Payload length mismatch: header says {declared}, datagram carries {actual}")]
    PayloadLengthMismatch { declared: usize, actual: usize },

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
