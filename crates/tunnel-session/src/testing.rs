//! Inert collaborators for unit tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tunnel_protocol::Token;
use tunnel_transport::{Connection, ConnectionId, TransportError};

use crate::{
    CipherFactory, EventHandler, Handshake, Multiplexer, Session, SessionMgr,
    StreamCipher, TunnelConn,
};

pub(crate) struct NullConn {
    peer: SocketAddr,
}

impl Connection for NullConn {
    async fn send(&self, _data: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(None)
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        ConnectionId::new(1)
    }

    fn remote_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[derive(Default)]
pub(crate) struct NullMux {
    destroyed: AtomicUsize,
}

impl NullMux {
    pub(crate) fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Multiplexer for NullMux {
    type Conn = NullConn;
    type Error = std::io::Error;

    async fn listen(
        &self,
        _tun: TunnelConn<NullConn>,
        _handler: Arc<dyn EventHandler>,
        _ping_interval: Duration,
    ) -> Result<(), std::io::Error> {
        Ok(())
    }

    fn best_send(&self, _frame: Vec<u8>, _label: &'static str) {}

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

struct NullCipher;

impl StreamCipher for NullCipher {
    fn apply_keystream(&mut self, _data: &mut [u8]) {}
}

struct NullCipherFactory;

impl CipherFactory for NullCipherFactory {
    fn new_cipher(&self, _token: &Token) -> Box<dyn StreamCipher> {
        Box::new(NullCipher)
    }
}

/// A session for `identity` whose first tunnel comes from 192.0.2.10:40100.
pub(crate) fn new_session(
    registry: &Arc<SessionMgr<NullMux>>,
    identity: &str,
) -> (Arc<Session<NullMux>>, TunnelConn<NullConn>) {
    new_session_from(registry, identity, "192.0.2.10:40100".parse().expect("valid address"))
}

/// A session for `identity` whose first tunnel comes from `peer`.
pub(crate) fn new_session_from(
    registry: &Arc<SessionMgr<NullMux>>,
    identity: &str,
    peer: SocketAddr,
) -> (Arc<Session<NullMux>>, TunnelConn<NullConn>) {
    let mut tun = TunnelConn::new(NullConn { peer });
    let session = Session::new(
        &mut tun,
        NullMux::default(),
        Arc::new(NullCipherFactory),
        Handshake {
            registry: Arc::clone(registry),
            client_identity: identity.to_string(),
        },
    );
    (session, tun)
}
