//! Socket state and the blocking receive path

use std::net::SocketAddrV4;
use std::sync::Condvar;

use tracing::trace;

use crate::mutex::{Mutex, MutexGuard};
use crate::recv_queue::{Readiness, RecvDatagram, RecvQueue};
use crate::transport::{ReadError, SocketError};

/// Transport state of a socket
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SocketState {
    /// No remote recorded; the socket may still be bound and receiving
    Unconnected,
    /// A remote has been recorded by connect
    Connected,
    /// Torn down; every operation fails
    Closed,
}

/// A socket: addressing, pending error, and receive queue behind the socket lock
///
/// The condition variable pairs with the lock to form the wait primitive for blocking
/// receive: producers signal it after enqueueing, consumers sleep on it when the queue is
/// empty.
pub(crate) struct Socket {
    state: Mutex<SocketInner>,
    /// Signaled when a datagram is delivered or the socket closes
    data_ready: Condvar,
}

pub(crate) struct SocketInner {
    pub state: SocketState,
    /// Bound local address and port, host order
    pub local: Option<SocketAddrV4>,
    /// Remote recorded by connect, host order
    pub remote: Option<SocketAddrV4>,
    /// Last asynchronous failure reported for this socket, checked by the send paths
    pub error: Option<SocketError>,
    pub queue: RecvQueue,
}

impl Socket {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SocketInner {
                state: SocketState::Unconnected,
                local: None,
                remote: None,
                error: None,
                queue: RecvQueue::default(),
            }),
            data_ready: Condvar::new(),
        }
    }

    pub fn lock(&self, purpose: &'static str) -> MutexGuard<'_, SocketInner> {
        self.state.lock(purpose)
    }

    /// Hand an inbound datagram to the receive queue and wake a blocked receiver
    ///
    /// This is the only window in the inbound path that holds the socket lock. A connected
    /// socket accepts datagrams only from its recorded remote port; anything else is dropped
    /// here, as is anything arriving after close.
    pub fn deliver(&self, datagram: RecvDatagram) {
        let mut inner = self.state.lock("deliver");
        match inner.state {
            SocketState::Closed => {
                trace!("datagram for closed socket, discarding");
                return;
            }
            SocketState::Connected => {
                if let Some(remote) = inner.remote {
                    if remote.port() != datagram.sender.port() {
                        trace!(
                            sender = %datagram.sender,
                            "sender does not match connected remote, discarding"
                        );
                        return;
                    }
                }
            }
            SocketState::Unconnected => {}
        }
        trace!(sender = %datagram.sender, len = datagram.payload.len(), "datagram enqueued");
        inner.queue.enqueue(datagram);
        self.data_ready.notify_one();
    }

    /// Blocking receive: copy the next datagram into `buf`
    ///
    /// Dequeues if data is pending; otherwise releases the socket, sleeps on the wait
    /// primitive, reacquires on wakeup and retries. Wakeups may be spurious, so the queue is
    /// re-checked every iteration rather than trusting the signal.
    pub fn receive(&self, buf: &mut [u8]) -> Result<(usize, SocketAddrV4), ReadError> {
        let mut inner = self.state.lock("receive");
        loop {
            if let Some((len, sender)) = inner.queue.dequeue(buf) {
                trace!(%sender, len, "datagram dequeued");
                return Ok((len, sender));
            }
            if inner.state == SocketState::Closed {
                return Err(ReadError::Closed);
            }
            inner = inner.wait(&self.data_ready);
        }
    }

    /// Wake every thread blocked in [`Socket::receive`]
    pub fn notify(&self) {
        self.data_ready.notify_all();
    }

    /// Tear down: drain the queue and wake sleepers so no receiver outlives the socket
    pub fn close(&self) {
        let mut inner = self.state.lock("close");
        inner.state = SocketState::Closed;
        inner.queue.clear();
        drop(inner);
        self.data_ready.notify_all();
    }

    pub fn readiness(&self) -> Readiness {
        self.state.lock("readiness").queue.readiness()
    }
}
