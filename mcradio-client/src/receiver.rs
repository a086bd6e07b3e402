//! Multicast reception and channel demultiplexing
//!
//! Every datagram on the group carries one channel's payload. The
//! demultiplexer decodes the header, keeps loss/reorder statistics over the
//! server's global sequence numbers and forwards only the payload of the
//! currently selected channel.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mcradio_common::config::NetworkConfig;
use mcradio_common::packet::MAX_DATAGRAM;
use mcradio_common::PacketHeader;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, warn};

use crate::control::ChannelSelection;
use crate::decoder::PayloadSink;
use crate::error::{Error, Result};

/// Read timeout so the receive loop notices shutdown
pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// UDP socket joined to the radio's multicast group
#[derive(Debug)]
pub struct MulticastReceiver {
    socket: UdpSocket,
}

impl MulticastReceiver {
    /// Bind `0.0.0.0:port` with `SO_REUSEADDR` and join the group
    pub fn open(network: &NetworkConfig) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| Error::Socket(format!("failed to create UDP socket: {}", e)))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| Error::Socket(format!("failed to set SO_REUSEADDR: {}", e)))?;

        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, network.port));
        socket
            .bind(&bind_addr.into())
            .map_err(|e| Error::Socket(format!("failed to bind {}: {}", bind_addr, e)))?;

        socket
            .join_multicast_v4(&network.group, &network.interface)
            .map_err(|e| {
                Error::Socket(format!(
                    "failed to join {} on {}: {}",
                    network.group, network.interface, e
                ))
            })?;

        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;

        info!(
            "Joined multicast group {} on port {}",
            network.group, network.port
        );
        Ok(Self { socket })
    }

    /// Wrap an already bound socket; a read timeout should be set
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// Receive one datagram
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf)
    }
}

/// Diagnostics gathered by the demultiplexer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub received: u64,
    pub malformed: u64,
    pub empty: u64,
    pub forwarded: u64,
    pub forwarded_bytes: u64,
    pub filtered: u64,
    /// Sequence numbers skipped over (datagrams lost or still in flight)
    pub gaps: u64,
    /// Datagrams arriving with a sequence not after the newest seen
    pub reordered: u64,
    pub last_sequence: Option<u32>,
}

impl ReceiverStats {
    fn observe_sequence(&mut self, sequence: u32) {
        let last = match self.last_sequence {
            Some(last) => last,
            None => {
                self.last_sequence = Some(sequence);
                return;
            }
        };

        // Wrapping distance; the upper half of the ring counts as "behind"
        let ahead = sequence.wrapping_sub(last);
        if ahead == 0 || ahead > u32::MAX / 2 {
            self.reordered += 1;
            debug!("Sequence {} arrived after {}", sequence, last);
        } else {
            if ahead > 1 {
                self.gaps += u64::from(ahead - 1);
                debug!("Sequence gap: {} -> {}", last, sequence);
            }
            self.last_sequence = Some(sequence);
        }
    }
}

/// What happened to a datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Payload of this many bytes went to the sink
    Forwarded(usize),
    /// Valid packet for a channel that is not selected
    Filtered,
    /// Valid header with no payload
    Empty,
    /// Header could not be decoded
    Malformed,
}

/// Routes payloads of the selected channel into a sink
pub struct Demultiplexer<S: PayloadSink> {
    selection: Arc<ChannelSelection>,
    sink: S,
    stats: ReceiverStats,
}

impl<S: PayloadSink> Demultiplexer<S> {
    pub fn new(selection: Arc<ChannelSelection>, sink: S) -> Self {
        Self {
            selection,
            sink,
            stats: ReceiverStats::default(),
        }
    }

    /// Process one datagram
    ///
    /// Only a sink write failure is an error; bad datagrams are counted and
    /// dropped.
    pub fn handle(&mut self, datagram: &[u8]) -> io::Result<Disposition> {
        self.stats.received += 1;

        let (header, payload) = match PacketHeader::decode(datagram) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Dropping malformed datagram: {}", e);
                return Ok(Disposition::Malformed);
            }
        };

        self.stats.observe_sequence(header.sequence);

        if payload.is_empty() {
            self.stats.empty += 1;
            return Ok(Disposition::Empty);
        }

        if !self.selection.is(header.channel_id) {
            self.stats.filtered += 1;
            return Ok(Disposition::Filtered);
        }

        self.sink.write_payload(payload)?;
        self.stats.forwarded += 1;
        self.stats.forwarded_bytes += payload.len() as u64;
        debug!(
            "Forwarded packet {} of channel {} ({} bytes)",
            header.sequence,
            header.channel_id,
            payload.len()
        );
        Ok(Disposition::Forwarded(payload.len()))
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Receive until `running` clears or the sink fails
///
/// Read timeouts only re-check the flag. A socket or sink failure is logged
/// and clears `running` before it is returned.
pub fn receive_loop<S: PayloadSink>(
    receiver: &MulticastReceiver,
    demux: &mut Demultiplexer<S>,
    running: &AtomicBool,
) -> Result<()> {
    let result = pump(receiver, demux, running);
    if let Err(e) = &result {
        error!("Receiver failed: {}", e);
        running.store(false, Ordering::SeqCst);
    }
    result
}

fn pump<S: PayloadSink>(
    receiver: &MulticastReceiver,
    demux: &mut Demultiplexer<S>,
    running: &AtomicBool,
) -> Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while running.load(Ordering::SeqCst) {
        let len = match receiver.recv(&mut buf) {
            Ok(len) => len,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        };

        if let Err(e) = demux.handle(&buf[..len]) {
            return Err(Error::Decoder(format!("failed to write payload: {}", e)));
        }
    }

    demux.sink_mut().flush()?;
    let stats = demux.stats();
    info!(
        "Receiver stopped: {} received, {} forwarded, {} malformed, {} lost, {} reordered",
        stats.received, stats.forwarded, stats.malformed, stats.gaps, stats.reordered
    );
    Ok(())
}
