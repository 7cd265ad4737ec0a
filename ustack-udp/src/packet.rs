//! The datagram wire format
//!
//! A datagram is an 8-byte header followed by payload: source port, destination port, total
//! length including the header, and checksum, each 16 bits and big-endian on the wire.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Size of the fixed datagram header in bytes
pub const HEADER_SIZE: usize = 8;

/// Offset of the checksum field within the header
pub(crate) const CHECKSUM_OFFSET: usize = 6;

/// The largest payload a single datagram can carry
///
/// An IPv4 packet is limited to 65535 bytes total; subtracting the 20-byte IP header and the
/// 8-byte datagram header leaves this many bytes for application data.
pub const MAX_PAYLOAD_SIZE: usize = 65507;

/// A datagram header in host byte order
///
/// Fields convert to host order exactly once on receive, after checksum verification, and back
/// to network order exactly once when a frame is assembled for transmission.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DatagramHeader {
    /// Port of the sending socket
    pub src_port: u16,
    /// Port of the socket the datagram is addressed to
    pub dst_port: u16,
    /// Total length of the datagram, header included
    pub length: u16,
    /// Checksum over the pseudo-header and datagram; see [`crate::checksum`]
    pub checksum: u16,
}

impl DatagramHeader {
    /// Decode the header at the start of `wire` and validate its length field
    ///
    /// `wire` is the entire buffer received from the IP layer. A declared length that is
    /// shorter than the header or claims more bytes than were actually received is rejected
    /// here, before anything downstream reads past the buffer.
    pub fn decode(wire: &[u8]) -> Result<Self, DecodeError> {
        let mut r = wire;
        if r.remaining() < HEADER_SIZE {
            return Err(DecodeError::UnexpectedEnd);
        }
        let header = Self {
            src_port: r.get_u16(),
            dst_port: r.get_u16(),
            length: r.get_u16(),
            checksum: r.get_u16(),
        };
        if (header.length as usize) < HEADER_SIZE {
            return Err(DecodeError::LengthUnderflow);
        }
        if header.length as usize > wire.len() {
            return Err(DecodeError::LengthOverrun);
        }
        Ok(header)
    }

    /// Encode the header in network byte order
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.src_port);
        buf.put_u16(self.dst_port);
        buf.put_u16(self.length);
        buf.put_u16(self.checksum);
    }

    /// Length of the payload that follows the header
    pub fn payload_len(&self) -> usize {
        self.length as usize - HEADER_SIZE
    }
}

/// Why a received buffer could not be decoded as a datagram
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum DecodeError {
    /// Fewer bytes arrived than a header occupies
    #[error("datagram too short for header")]
    UnexpectedEnd,
    /// The length field claims less than the header itself
    #[error("declared length shorter than header")]
    LengthUnderflow,
    /// The length field claims more bytes than were received
    #[error("declared length exceeds received bytes")]
    LengthOverrun,
}
