//! Multicast datagram sender
//!
//! One UDP socket shared by every streaming task. `UdpSocket::send_to` takes
//! `&self` and each call emits a whole datagram, so the sender needs no lock.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use mcradio_common::config::NetworkConfig;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Destination for complete datagrams
pub trait DatagramSink: Send + Sync {
    /// Send one datagram, returning the number of bytes written
    fn send(&self, datagram: &[u8]) -> io::Result<usize>;
}

/// UDP socket configured for IPv4 multicast sending
#[derive(Debug)]
pub struct MulticastSender {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl MulticastSender {
    /// Open a sender for the configured group
    ///
    /// Failing to pin the outgoing interface only logs a warning; the OS
    /// then picks the route.
    pub fn open(network: &NetworkConfig) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| Error::Socket(format!("failed to create UDP socket: {}", e)))?;

        socket
            .set_multicast_ttl_v4(network.ttl)
            .map_err(|e| Error::Socket(format!("failed to set multicast TTL: {}", e)))?;
        socket
            .set_multicast_loop_v4(true)
            .map_err(|e| Error::Socket(format!("failed to enable multicast loopback: {}", e)))?;

        if network.interface != Ipv4Addr::UNSPECIFIED {
            match socket.set_multicast_if_v4(&network.interface) {
                Ok(()) => debug!("Multicast interface set to {}", network.interface),
                Err(e) => warn!(
                    "Failed to set multicast interface {}: {}",
                    network.interface, e
                ),
            }
        }

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        socket
            .bind(&SocketAddr::V4(bind_addr).into())
            .map_err(|e| Error::Socket(format!("failed to bind sender socket: {}", e)))?;

        let destination = SocketAddr::V4(network.destination());
        info!(
            "Multicast sender ready: {} (ttl {}, loopback on)",
            destination, network.ttl
        );

        Ok(Self {
            socket: socket.into(),
            destination,
        })
    }

    /// Wrap an already configured socket
    pub fn from_socket(socket: UdpSocket, destination: SocketAddr) -> Self {
        Self {
            socket,
            destination,
        }
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

impl DatagramSink for MulticastSender {
    fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        self.socket.send_to(datagram, self.destination)
    }
}
