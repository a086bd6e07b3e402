//! # mcradio Common Library
//!
//! Shared code for the mcradio server and client including:
//! - Error types
//! - Configuration loading and root folder resolution
//! - Logging setup
//! - Packet wire format and sequence numbering
//! - Channel media library
//! - Elastic worker pool

pub mod config;
pub mod error;
pub mod logging;
pub mod media_library;
pub mod packet;
pub mod worker_pool;

pub use error::{Error, Result};
pub use media_library::{ChannelSummary, LibrarySettings, MediaLibrary};
pub use packet::{PacketHeader, SequenceGenerator};
pub use worker_pool::{PoolConfig, SubmitError, WorkerPool};

/// Channel identifier as carried on the wire
pub type ChannelId = u16;
