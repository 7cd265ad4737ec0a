//! UDP protocol layer for the ustack user-space TCP/IP stack
//!
//! This crate performs no network I/O of its own. The IP layer below it is an injected
//! [`IpLayer`] trait object, and the generic socket layer above it drives sockets through the
//! [`Transport`] trait without knowing the concrete protocol.
//!
//! The most important type is [`Endpoint`], which owns the port-indexed socket table and both
//! packet paths: the network input thread feeds inbound datagrams through [`Endpoint::handle`],
//! which verifies the checksum, demultiplexes on the destination port and wakes any consumer
//! blocked in a receive call; application threads bind, connect and send through the
//! [`Transport`] operations, which assemble wire-order frames and hand them to the IP layer.
//!
//! Delivery is unreliable and unordered by design: anything malformed is logged and silently
//! discarded, and transmission failures below the UDP layer are not surfaced to senders.

#![warn(missing_docs)]
#![cfg_attr(test, allow(dead_code))]

pub mod checksum;

mod config;
pub use config::{ConfigError, EndpointConfig};

mod endpoint;
pub use endpoint::{Endpoint, SocketHandle};

mod mutex;

mod packet;
pub use packet::{DatagramHeader, DecodeError, HEADER_SIZE, MAX_PAYLOAD_SIZE};

mod recv_queue;
pub use recv_queue::Readiness;

mod shared;
pub use shared::{IpLayer, Transmit};

mod socket;
pub use socket::SocketState;

mod transport;
pub use transport::{BindError, ReadError, SendError, SocketError, Transport};


/// The IP protocol number carried by every datagram this layer consumes or emits
pub const PROTOCOL: u8 = 17;
