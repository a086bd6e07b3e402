//! mcradio-server library
//!
//! Streams every channel of a media library to an IPv4 multicast group, one
//! worker-pool task per channel.

pub mod config;
pub mod error;
pub mod sender;
pub mod server;
pub mod streaming;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use sender::{DatagramSink, MulticastSender};
pub use server::RadioServer;
pub use streaming::{StreamSettings, StreamingTask};
