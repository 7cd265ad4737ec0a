//! The UDP protocol engine: demultiplexing, frame assembly, and socket control

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rustc_hash::FxHashMap;
use slab::Slab;
use tracing::{debug, trace, warn};

use crate::checksum;
use crate::config::EndpointConfig;
use crate::mutex::Mutex;
use crate::packet::{DatagramHeader, CHECKSUM_OFFSET, HEADER_SIZE};
use crate::recv_queue::{Readiness, RecvDatagram};
use crate::shared::{IpLayer, Transmit};
use crate::socket::{Socket, SocketState};
use crate::transport::{BindError, ReadError, SendError, SocketError, Transport};

const ETHERNET_HEADER_SIZE: usize = 14;
const IPV4_HEADER_SIZE: usize = 20;

/// Space reserved ahead of the datagram so the lower layers can frame it without reallocating
const FRAME_HEADROOM: usize = ETHERNET_HEADER_SIZE + IPV4_HEADER_SIZE;

/// Random probes before falling back to a scan of the ephemeral range
const EPHEMERAL_PROBES: usize = 32;

/// The main entry point to the protocol layer
///
/// Owns the port-indexed socket table and both packet paths. The network input thread feeds
/// inbound datagrams through [`Endpoint::handle`]; application threads drive the socket
/// operations through the [`Transport`] impl. The IP layer below is the injected [`IpLayer`].
pub struct Endpoint {
    sockets: Mutex<SocketTable>,
    ip: Arc<dyn IpLayer>,
    config: EndpointConfig,
}

impl Endpoint {
    /// Create an endpoint transmitting through `ip`
    pub fn new(config: EndpointConfig, ip: Arc<dyn IpLayer>) -> Self {
        Self {
            sockets: Mutex::new(SocketTable {
                sockets: Slab::new(),
                ports: FxHashMap::default(),
                rng: StdRng::from_entropy(),
            }),
            ip,
            config,
        }
    }

    /// Process an inbound datagram
    ///
    /// `data` holds the bytes following the IP header; `src_addr` and `dst_addr` are the
    /// addresses the IP layer recovered for checksum verification and sender reporting.
    /// Malformed datagrams and datagrams for unknown ports are logged and silently dropped,
    /// consistent with unreliable delivery; nothing here fails upstream.
    pub fn handle(&self, src_addr: Ipv4Addr, dst_addr: Ipv4Addr, data: BytesMut) {
        let wire = data.freeze();
        let header = match DatagramHeader::decode(&wire) {
            Ok(header) => header,
            Err(e) => {
                trace!("malformed datagram: {}", e);
                return;
            }
        };
        // The checksum runs over wire-order bytes, bounded by the declared length the decode
        // step validated against the received buffer.
        let segment = &wire[..header.length as usize];
        if !checksum::verify(src_addr, dst_addr, segment) {
            debug!(src = %src_addr, "checksum mismatch, discarding");
            return;
        }
        trace!(
            "in {} > {}: checksum {:#06x}",
            header.src_port,
            header.dst_port,
            header.checksum
        );

        let socket = {
            let table = self.sockets.lock("lookup");
            match table.ports.get(&header.dst_port) {
                Some(&handle) => table.sockets[handle.0].clone(),
                None => {
                    debug!(
                        "no socket for sport {} dport {}",
                        header.src_port, header.dst_port
                    );
                    return;
                }
            }
        };
        socket.deliver(RecvDatagram {
            payload: wire.slice(HEADER_SIZE..header.length as usize),
            sender: SocketAddrV4::new(src_addr, header.src_port),
        });
    }

    /// Record an asynchronous failure (e.g. an ICMP error) in the socket's error slot
    ///
    /// The next write on the socket returns the stored error instead of transmitting.
    pub fn report_error(&self, socket: SocketHandle, error: SocketError) -> Result<(), SocketError> {
        let socket = self.socket(socket)?;
        socket.lock("report error").error = Some(error);
        Ok(())
    }

    fn socket(&self, handle: SocketHandle) -> Result<Arc<Socket>, SocketError> {
        self.sockets
            .lock("socket")
            .sockets
            .get(handle.0)
            .cloned()
            .ok_or(SocketError::BadDescriptor)
    }

    /// Common write-path checks: handle validity, pending error, state, destination
    ///
    /// Assigns an ephemeral local port on a socket's first send. Returns the addressing for
    /// the frame with every lock released, so frame assembly and transmission run unlocked.
    fn writable_addressing(
        &self,
        handle: SocketHandle,
        destination: Option<SocketAddrV4>,
    ) -> Result<(SocketAddrV4, SocketAddrV4), SendError> {
        let mut table = self.sockets.lock("send");
        let socket = table
            .sockets
            .get(handle.0)
            .cloned()
            .ok_or(SocketError::BadDescriptor)?;
        let mut inner = socket.lock("send");
        if let Some(error) = inner.error {
            return Err(SendError::Socket(error));
        }
        match inner.state {
            SocketState::Unconnected | SocketState::Connected => {}
            SocketState::Closed => return Err(SendError::Socket(SocketError::BadDescriptor)),
        }
        let remote = destination
            .or(inner.remote)
            .ok_or(SendError::DestinationUnset)?;
        let local = match inner.local {
            Some(local) => local,
            None => {
                let port = self
                    .allocate_ephemeral_port(&mut table)
                    .ok_or(SocketError::PortsExhausted)?;
                let local = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
                table.ports.insert(port, handle);
                inner.local = Some(local);
                local
            }
        };
        Ok((local, remote))
    }

    /// Assemble one wire-order frame and hand it to the IP layer
    ///
    /// Transmission failures are logged, not surfaced: the caller is told the requested
    /// length either way.
    fn send_datagram(&self, local: SocketAddrV4, remote: SocketAddrV4, payload: &[u8]) -> usize {
        let mut frame = BytesMut::with_capacity(FRAME_HEADROOM + HEADER_SIZE + payload.len());
        DatagramHeader {
            src_port: local.port(),
            dst_port: remote.port(),
            length: (HEADER_SIZE + payload.len()) as u16,
            checksum: 0,
        }
        .encode(&mut frame);
        frame.put_slice(payload);
        let sum = checksum::compute(*local.ip(), *remote.ip(), &frame);
        frame[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
        trace!(
            "out {} > {}: checksum {:#06x}",
            local.port(),
            remote.port(),
            sum
        );

        if let Err(e) = self.ip.output(Transmit {
            source: local,
            destination: remote,
            contents: frame.freeze(),
        }) {
            warn!("IP output failed: {}", e);
        }
        payload.len()
    }

    fn allocate_ephemeral_port(&self, table: &mut SocketTable) -> Option<u16> {
        let range = self.config.ephemeral_ports.clone();
        for _ in 0..EPHEMERAL_PROBES {
            let port = table.rng.gen_range(range.clone());
            if !table.ports.contains_key(&port) {
                return Some(port);
            }
        }
        range.clone().find(|port| !table.ports.contains_key(port))
    }
}

impl Transport for Endpoint {
    fn open(&self) -> SocketHandle {
        let mut table = self.sockets.lock("open");
        let handle = SocketHandle(table.sockets.insert(Arc::new(Socket::new())));
        trace!(?handle, "socket opened");
        handle
    }

    fn bind(&self, handle: SocketHandle, local: SocketAddrV4) -> Result<(), BindError> {
        let mut table = self.sockets.lock("bind");
        let socket = table
            .sockets
            .get(handle.0)
            .cloned()
            .ok_or(SocketError::BadDescriptor)?;
        if let Some(&holder) = table.ports.get(&local.port()) {
            if holder != handle {
                return Err(BindError::AddrInUse);
            }
        }
        let mut inner = socket.lock("bind");
        if let Some(previous) = inner.local {
            table.ports.remove(&previous.port());
        }
        table.ports.insert(local.port(), handle);
        inner.local = Some(local);
        trace!(?handle, %local, "socket bound");
        Ok(())
    }

    fn connect(&self, handle: SocketHandle, remote: SocketAddrV4) -> Result<(), SocketError> {
        let mut table = self.sockets.lock("connect");
        let socket = table
            .sockets
            .get(handle.0)
            .cloned()
            .ok_or(SocketError::BadDescriptor)?;
        let mut inner = socket.lock("connect");
        if inner.state == SocketState::Closed {
            return Err(SocketError::BadDescriptor);
        }
        if inner.local.is_none() {
            let port = self
                .allocate_ephemeral_port(&mut table)
                .ok_or(SocketError::PortsExhausted)?;
            table.ports.insert(port, handle);
            inner.local = Some(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        }
        inner.remote = Some(remote);
        inner.state = SocketState::Connected;
        trace!(?handle, %remote, "socket connected");
        Ok(())
    }

    fn disconnect(&self, handle: SocketHandle) -> Result<(), SocketError> {
        let socket = self.socket(handle)?;
        let mut inner = socket.lock("disconnect");
        inner.remote = None;
        inner.state = SocketState::Unconnected;
        Ok(())
    }

    fn write(&self, handle: SocketHandle, payload: &[u8]) -> Result<usize, SendError> {
        let (local, remote) = self.writable_addressing(handle, None)?;
        if payload.len() > self.config.max_payload_size {
            return Err(SendError::TooLarge);
        }
        Ok(self.send_datagram(local, remote, payload))
    }

    fn sendto(
        &self,
        handle: SocketHandle,
        payload: &[u8],
        destination: SocketAddrV4,
    ) -> Result<usize, SendError> {
        let (local, remote) = self.writable_addressing(handle, Some(destination))?;
        if payload.len() > self.config.max_payload_size {
            return Err(SendError::TooLarge);
        }
        Ok(self.send_datagram(local, remote, payload))
    }

    fn read(&self, handle: SocketHandle, buf: &mut [u8]) -> Result<usize, ReadError> {
        self.recvfrom(handle, buf).map(|(len, _)| len)
    }

    fn recvfrom(
        &self,
        handle: SocketHandle,
        buf: &mut [u8],
    ) -> Result<(usize, SocketAddrV4), ReadError> {
        let socket = self.socket(handle).map_err(|_| ReadError::BadDescriptor)?;
        socket.receive(buf)
    }

    fn recv_notify(&self, handle: SocketHandle) -> Result<(), SocketError> {
        self.socket(handle)?.notify();
        Ok(())
    }

    fn close(&self, handle: SocketHandle) -> Result<(), SocketError> {
        let socket = {
            let mut table = self.sockets.lock("close");
            if !table.sockets.contains(handle.0) {
                return Err(SocketError::BadDescriptor);
            }
            let socket = table.sockets.remove(handle.0);
            if let Some(local) = socket.lock("unbind").local {
                table.ports.remove(&local.port());
            }
            socket
        };
        // Queued buffers are released here; a blocked receiver wakes with `Closed`
        socket.close();
        trace!(?handle, "socket closed");
        Ok(())
    }

    fn abort(&self, handle: SocketHandle) -> Result<(), SocketError> {
        self.close(handle)
    }

    fn state(&self, handle: SocketHandle) -> Option<SocketState> {
        let socket = self.socket(handle).ok()?;
        let state = socket.lock("state").state;
        Some(state)
    }

    fn readiness(&self, handle: SocketHandle) -> Readiness {
        match self.socket(handle) {
            Ok(socket) => socket.readiness(),
            Err(_) => Readiness::EMPTY,
        }
    }
}

struct SocketTable {
    sockets: Slab<Arc<Socket>>,
    /// Local port to socket: the demultiplexing key and the bind-conflict check
    ports: FxHashMap<u16, SocketHandle>,
    rng: StdRng,
}

/// External handle to a socket within an [`Endpoint`]
///
/// Stable for the socket's lifetime; operations on a handle whose socket has been closed fail
/// with a bad-descriptor-class error.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SocketHandle(pub(crate) usize);

impl From<SocketHandle> for usize {
    fn from(x: SocketHandle) -> Self {
        x.0
    }
}
