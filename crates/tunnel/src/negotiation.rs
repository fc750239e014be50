//! The handshake seam.
//!
//! Key exchange and identity checks live outside this crate. The
//! server only needs to know how a handshake ended: a brand-new session,
//! a tunnel joining an existing session by token, or a rejection.

use std::future::Future;
use std::sync::Arc;

use tunnel_protocol::{ProtocolError, Token};
use tunnel_session::{Multiplexer, Session, SessionError, SessionMgr, TunnelConn};
use tunnel_transport::TransportError;

use crate::TunnelError;

/// Runs the server side of the handshake on a fresh connection.
///
/// # Example
///
/// ```rust,ignore
/// impl Negotiator<MyMux> for MyHandshake {
///     async fn negotiate(
///         &self,
///         tun: &mut TunnelConn<TcpConnection>,
///         registry: &Arc<SessionMgr<MyMux>>,
///     ) -> Result<Negotiated<MyMux>, Rejected<MyMux>> {
///         let hello = tun.conn().recv().await?.ok_or_else(|| {
///             TunnelError::Handshake("closed before hello".into())
///         })?;
///         if let Ok(token) = Token::from_slice(&hello) {
///             let session = registry.redeem(&token)?;
///             return Ok(Negotiated::DataTunnel { session, token });
///         }
///         // ... full key exchange, then Session::new(...)
///     }
/// }
/// ```
pub trait Negotiator<M: Multiplexer>: Send + Sync + 'static {
    /// Negotiates `tun`, keying it and resolving its session.
    ///
    /// Token redemption goes through `registry`, which makes it single
    /// use. A miss must come back as a rejection, never a panic.
    fn negotiate(
        &self,
        tun: &mut TunnelConn<M::Conn>,
        registry: &Arc<SessionMgr<M>>,
    ) -> impl Future<Output = Result<Negotiated<M>, Rejected<M>>> + Send;
}

/// A successful handshake.
pub enum Negotiated<M: Multiplexer> {
    /// Full handshake: a new session, and `tun` is already keyed.
    NewSession(Arc<Session<M>>),
    /// Fast path: `token` was redeemed for `session`. The tunnel's cipher
    /// is derived from the token.
    DataTunnel {
        session: Arc<Session<M>>,
        token: Token,
    },
}

/// A failed handshake.
///
/// If the handshake got far enough to build a session, it is returned
/// here so the server can revoke whatever tokens it was issued.
pub struct Rejected<M: Multiplexer> {
    pub error: TunnelError,
    pub session: Option<Arc<Session<M>>>,
}

impl<M: Multiplexer> Rejected<M> {
    /// A rejection before any session existed.
    pub fn new(error: impl Into<TunnelError>) -> Self {
        Self {
            error: error.into(),
            session: None,
        }
    }

    /// A rejection after `session` was built.
    pub fn with_session(error: impl Into<TunnelError>, session: Arc<Session<M>>) -> Self {
        Self {
            error: error.into(),
            session: Some(session),
        }
    }
}

impl<M: Multiplexer> From<TunnelError> for Rejected<M> {
    fn from(error: TunnelError) -> Self {
        Self::new(error)
    }
}

impl<M: Multiplexer> From<TransportError> for Rejected<M> {
    fn from(error: TransportError) -> Self {
        Self::new(error)
    }
}

impl<M: Multiplexer> From<ProtocolError> for Rejected<M> {
    fn from(error: ProtocolError) -> Self {
        Self::new(error)
    }
}

impl<M: Multiplexer> From<SessionError> for Rejected<M> {
    fn from(error: SessionError) -> Self {
        Self::new(error)
    }
}
