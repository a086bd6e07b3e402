//! mcradio-client library
//!
//! Joins the radio's multicast group, keeps the payload of the channel the
//! operator selected and feeds it to a decoder process or a raw writer.

pub mod config;
pub mod control;
pub mod decoder;
pub mod error;
pub mod receiver;

pub use config::ClientConfig;
pub use control::{ChannelDirectory, ChannelSelection};
pub use decoder::{DecoderProcess, PayloadSink, WriterSink};
pub use error::{Error, Result};
pub use receiver::{Demultiplexer, MulticastReceiver, ReceiverStats};
