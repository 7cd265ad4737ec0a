//! The protocol operation table driven by the generic socket layer
//!
//! The socket layer holds an `Arc<dyn Transport>` per protocol and dispatches on it without
//! knowing which transport sits behind the file descriptor. [`Endpoint`](crate::Endpoint) is
//! the UDP implementation.

use std::net::SocketAddrV4;

use thiserror::Error;

use crate::endpoint::SocketHandle;
use crate::recv_queue::Readiness;
use crate::socket::SocketState;

/// Protocol operations exposed uniformly to the generic socket layer
pub trait Transport: Send + Sync {
    /// Allocate a fresh socket, zero-initialized and unconnected
    fn open(&self) -> SocketHandle;

    /// Reserve `local` for this socket
    ///
    /// Fails with [`BindError::AddrInUse`] when another socket already holds the port for this
    /// protocol. Rebinding the same socket releases its previous port.
    fn bind(&self, socket: SocketHandle, local: SocketAddrV4) -> Result<(), BindError>;

    /// Record `remote` as the socket's destination and transition to connected
    ///
    /// Purely local state; nothing is transmitted. A socket without a local port is assigned
    /// an ephemeral one.
    fn connect(&self, socket: SocketHandle, remote: SocketAddrV4) -> Result<(), SocketError>;

    /// Clear the recorded remote and return to unconnected
    fn disconnect(&self, socket: SocketHandle) -> Result<(), SocketError>;

    /// Send `payload` to the connected remote
    ///
    /// Requires an error-free socket in a valid state; the returned count is the payload
    /// length, reported regardless of the IP layer's transmission outcome.
    fn write(&self, socket: SocketHandle, payload: &[u8]) -> Result<usize, SendError>;

    /// Send `payload` to `destination`, overriding any connected remote for this call only
    fn sendto(
        &self,
        socket: SocketHandle,
        payload: &[u8],
        destination: SocketAddrV4,
    ) -> Result<usize, SendError>;

    /// Block until a datagram arrives and copy it into `buf`, discarding the sender
    ///
    /// Returns the full datagram length even when only `buf.len()` bytes were copied; excess
    /// bytes are silently dropped.
    fn read(&self, socket: SocketHandle, buf: &mut [u8]) -> Result<usize, ReadError>;

    /// Block until a datagram arrives and copy it into `buf`, reporting the sender
    ///
    /// Same truncation and length-reporting convention as [`Transport::read`].
    fn recvfrom(
        &self,
        socket: SocketHandle,
        buf: &mut [u8],
    ) -> Result<(usize, SocketAddrV4), ReadError>;

    /// Wake any thread blocked receiving on the socket
    fn recv_notify(&self, socket: SocketHandle) -> Result<(), SocketError>;

    /// Release the socket's resources; queued datagrams are dropped and blocked receivers wake
    fn close(&self, socket: SocketHandle) -> Result<(), SocketError>;

    /// Forcibly tear the socket down
    fn abort(&self, socket: SocketHandle) -> Result<(), SocketError>;

    /// Current transport state, or `None` for a stale handle
    fn state(&self, socket: SocketHandle) -> Option<SocketState>;

    /// Current poll readiness of the socket
    fn readiness(&self, socket: SocketHandle) -> Readiness;
}

/// Bad-descriptor-class failures, also the values a socket's error slot can hold
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum SocketError {
    /// The handle does not refer to a live socket
    #[error("unknown or closed socket")]
    BadDescriptor,
    /// No port was available in the configured ephemeral range
    #[error("no ephemeral port available")]
    PortsExhausted,
    /// The IP layer reported the last destination unreachable
    #[error("destination unreachable")]
    Unreachable,
}

/// Errors from [`Transport::bind`]
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum BindError {
    /// Another socket is already bound to the requested port
    #[error("port already in use")]
    AddrInUse,
    /// The socket itself is not usable
    #[error(transparent)]
    Socket(#[from] SocketError),
}

/// Errors from [`Transport::write`] and [`Transport::sendto`]
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum SendError {
    /// The socket is stale, closed, or carries a pending error
    #[error(transparent)]
    Socket(#[from] SocketError),
    /// The socket has no recorded remote and no destination was supplied
    #[error("no destination recorded for the socket")]
    DestinationUnset,
    /// The payload exceeds the configured maximum datagram size
    #[error("payload exceeds the maximum datagram size")]
    TooLarge,
}

/// Errors from [`Transport::read`] and [`Transport::recvfrom`]
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum ReadError {
    /// The handle does not refer to a live socket
    #[error("unknown or closed socket")]
    BadDescriptor,
    /// The socket was closed while the receiver was blocked
    #[error("socket closed while receiving")]
    Closed,
}
