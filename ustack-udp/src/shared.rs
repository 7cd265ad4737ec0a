//! Types crossing the boundary between this layer and the IP layer

use std::io;
use std::net::SocketAddrV4;

use bytes::Bytes;

/// An assembled outgoing datagram, ready for IP framing
#[derive(Debug, Clone)]
pub struct Transmit {
    /// Local address the datagram is sent from
    ///
    /// An unbound-address socket sends from `0.0.0.0`; the IP layer's routing decides the
    /// actual source in that case.
    pub source: SocketAddrV4,
    /// Remote address the datagram is destined to
    pub destination: SocketAddrV4,
    /// Header and payload in wire order, checksum filled in
    pub contents: Bytes,
}

/// The IP layer's transmission entry point, injected into an [`Endpoint`](crate::Endpoint)
///
/// Implementations frame the datagram into an IP packet and pass it to the link layer. An
/// `Err` corresponds to a failed transmission; the UDP layer logs it and reports success to
/// its caller anyway, keeping fire-and-forget semantics.
pub trait IpLayer: Send + Sync {
    /// Frame and transmit a single datagram, returning the bytes accepted
    fn output(&self, transmit: Transmit) -> io::Result<usize>;
}
