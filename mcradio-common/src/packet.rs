//! Packet wire format
//!
//! Every datagram is `[PacketHeader][payload]`. The header is packed, 10 bytes,
//! all fields big-endian:
//!
//! | offset | size | field          |
//! |--------|------|----------------|
//! | 0      | 2    | channel id     |
//! | 2      | 4    | sequence number|
//! | 6      | 4    | payload length |

use std::sync::atomic::{AtomicU32, Ordering};

use crate::{ChannelId, Error, Result};

/// Encoded header size in bytes
pub const HEADER_LEN: usize = 10;

/// Largest payload a single datagram may carry
pub const MAX_PAYLOAD: usize = 60_000;

/// Largest datagram the sender will ever emit
pub const MAX_DATAGRAM: usize = HEADER_LEN + MAX_PAYLOAD;

/// Fixed-size prefix of every datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub channel_id: ChannelId,
    pub sequence: u32,
    pub payload_len: u32,
}

impl PacketHeader {
    pub fn new(channel_id: ChannelId, sequence: u32, payload_len: usize) -> Result<Self> {
        if payload_len > MAX_PAYLOAD {
            return Err(Error::InvalidInput(format!(
                "payload of {} bytes exceeds maximum of {}",
                payload_len, MAX_PAYLOAD
            )));
        }

        Ok(Self {
            channel_id,
            sequence,
            payload_len: payload_len as u32,
        })
    }

    /// Write the header in network byte order into the first `HEADER_LEN` bytes of `out`
    ///
    /// Panics if `out` is shorter than `HEADER_LEN`.
    pub fn encode_into(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.channel_id.to_be_bytes());
        out[2..6].copy_from_slice(&self.sequence.to_be_bytes());
        out[6..10].copy_from_slice(&self.payload_len.to_be_bytes());
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        self.encode_into(&mut bytes);
        bytes
    }

    /// Split a datagram into header and payload
    ///
    /// Rejects datagrams shorter than a header and datagrams whose declared
    /// payload length differs from the bytes that actually follow.
    pub fn decode(datagram: &[u8]) -> Result<(PacketHeader, &[u8])> {
        if datagram.len() < HEADER_LEN {
            return Err(Error::TruncatedPacket {
                len: datagram.len(),
                needed: HEADER_LEN,
            });
        }

        let channel_id = u16::from_be_bytes([datagram[0], datagram[1]]);
        let sequence = u32::from_be_bytes([datagram[2], datagram[3], datagram[4], datagram[5]]);
        let payload_len = u32::from_be_bytes([datagram[6], datagram[7], datagram[8], datagram[9]]);

        let payload = &datagram[HEADER_LEN..];
        if payload_len as usize != payload.len() {
            return Err(Error::PayloadLengthMismatch {
                declared: payload_len as usize,
                actual: payload.len(),
            });
        }

        Ok((
            PacketHeader {
                channel_id,
                sequence,
                payload_len,
            },
            payload,
        ))
    }
}

/// Process-wide packet sequence counter
///
/// One instance is created at startup and shared (`Arc`) by every streaming
/// task, so sequence numbers increase across all channels combined rather than
/// per channel. Wraps after 2^32 packets.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    next: AtomicU32,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// Claim the next sequence number
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Value the next call to `next()` will return
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}
