//! Per-socket FIFO of arrived datagrams
//!
//! The queue itself carries no lock; enqueue and dequeue callers hold the owning socket's
//! exclusive access, and exactly one consumer removes datagrams at a time.

use std::collections::VecDeque;
use std::net::SocketAddrV4;
use std::ops;

use bytes::Bytes;

/// Poll-event bits reported for a socket
///
/// Mirrors the readable bands a poll-style socket layer distinguishes: plain readability,
/// urgent data, and the normal/urgent read bands.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Readiness(u16);

impl Readiness {
    /// No event pending
    pub const EMPTY: Self = Self(0);
    /// Data may be read without blocking
    pub const READABLE: Self = Self(1 << 0);
    /// Urgent data pending
    pub const PRIORITY: Self = Self(1 << 1);
    /// Normal-band read will not block
    pub const READ_NORMAL: Self = Self(1 << 2);
    /// Urgent-band read will not block
    pub const READ_URGENT: Self = Self(1 << 3);

    /// Whether every bit of `other` is set in `self`
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no event is pending
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl ops::BitOr for Readiness {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A datagram delivered to a socket and awaiting a consumer
///
/// `payload` is a view into the buffer the IP layer handed up; the allocation is shared, and
/// dropping the last view releases it.
#[derive(Debug, Clone)]
pub(crate) struct RecvDatagram {
    pub payload: Bytes,
    pub sender: SocketAddrV4,
}

/// FIFO of datagrams with the socket's readiness bookkeeping
#[derive(Debug, Default)]
pub(crate) struct RecvQueue {
    datagrams: VecDeque<RecvDatagram>,
    readiness: Readiness,
}

impl RecvQueue {
    /// Append a datagram at the tail and mark the socket readable
    ///
    /// Never fails and applies no backpressure; see DESIGN.md on the unbounded queue.
    pub fn enqueue(&mut self, datagram: RecvDatagram) {
        self.datagrams.push_back(datagram);
        self.readiness |= Readiness::READABLE
            | Readiness::PRIORITY
            | Readiness::READ_NORMAL
            | Readiness::READ_URGENT;
    }

    /// Remove the head datagram, copying its payload into `buf`
    ///
    /// Returns `None` when the queue is empty; blocking is the caller's concern. A payload
    /// larger than `buf` is silently truncated, and the returned count is always the full
    /// datagram length, so callers learn how much data arrived rather than how much fit.
    pub fn dequeue(&mut self, buf: &mut [u8]) -> Option<(usize, SocketAddrV4)> {
        let datagram = self.datagrams.pop_front()?;
        let copied = datagram.payload.len().min(buf.len());
        buf[..copied].copy_from_slice(&datagram.payload[..copied]);
        if self.datagrams.is_empty() {
            self.readiness = Readiness::EMPTY;
        }
        Some((datagram.payload.len(), datagram.sender))
    }

    /// Drop every queued datagram, releasing their buffers
    pub fn clear(&mut self) {
        self.datagrams.clear();
        self.readiness = Readiness::EMPTY;
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn is_empty(&self) -> bool {
        self.datagrams.is_empty()
    }
}
