use std::io::{self, Write};
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

use crate::{Endpoint, EndpointConfig, IpLayer, Transmit};

pub(super) fn subscribe() -> DefaultGuard {
    let sub = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")),
        )
        .with_writer(|| TestWriter)
        .finish();
    tracing::subscriber::set_default(sub)
}

struct TestWriter;

impl Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        print!(
            "{}",
            str::from_utf8(buf).expect("tried to log invalid UTF-8")
        );
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// IP layer stub: records every transmit and forwards it to a peer endpoint, if any
#[derive(Default)]
pub(super) struct TestIp {
    peer: Mutex<Option<Arc<Endpoint>>>,
    /// Every datagram handed down by the UDP layer, in order
    pub sent: Mutex<Vec<Transmit>>,
    /// When set, transmissions are still recorded but reported failed
    pub fail: AtomicBool,
}

impl TestIp {
    pub fn set_peer(&self, peer: &Arc<Endpoint>) {
        *self.peer.lock().unwrap() = Some(peer.clone());
    }
}

impl IpLayer for TestIp {
    fn output(&self, transmit: Transmit) -> io::Result<usize> {
        let len = transmit.contents.len();
        self.sent.lock().unwrap().push(transmit.clone());
        if self.fail.load(Ordering::Relaxed) {
            return Err(io::Error::new(io::ErrorKind::Other, "link down"));
        }
        if let Some(peer) = self.peer.lock().unwrap().clone() {
            peer.handle(
                *transmit.source.ip(),
                *transmit.destination.ip(),
                BytesMut::from(&transmit.contents[..]),
            );
        }
        Ok(len)
    }
}

/// An endpoint with its recording IP layer
pub(super) struct Node {
    pub endpoint: Arc<Endpoint>,
    pub ip: Arc<TestIp>,
}

impl Node {
    pub fn new() -> Self {
        Self::with_config(EndpointConfig::default())
    }

    pub fn with_config(config: EndpointConfig) -> Self {
        let ip = Arc::new(TestIp::default());
        let endpoint = Arc::new(Endpoint::new(config, ip.clone()));
        Self { endpoint, ip }
    }
}

/// Two endpoints joined back-to-back, standing in for two hosts on a link
pub(super) struct Pair {
    pub client: Node,
    pub server: Node,
}

impl Pair {
    pub fn new() -> Self {
        let client = Node::new();
        let server = Node::new();
        client.ip.set_peer(&server.endpoint);
        server.ip.set_peer(&client.endpoint);
        Self { client, server }
    }
}
