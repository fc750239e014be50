//! `TunnelServer` builder and accept loop.
//!
//! This is the entry point for running the tunnel's session layer. It ties
//! together transport → handshake → session: every accepted connection
//! is negotiated, then handed to its session's data path on its own task.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Serialize;
use tunnel_session::helpers::report_panic;
use tunnel_session::{Multiplexer, Session, SessionConfig, SessionMgr, TunnelConn};
use tunnel_transport::{Connection, TcpConnection, TcpTransport, Transport};

use crate::{Negotiated, Negotiator, Rejected, TunnelError};

/// Point-in-time counters for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    /// Tokens minted and not yet redeemed or revoked.
    pub outstanding_tokens: usize,
}

/// Binds handshake results to serving sessions.
///
/// Owns the token registry; there is no process-wide registry.
pub struct TunnelServer<N, M: Multiplexer> {
    negotiator: N,
    registry: Arc<SessionMgr<M>>,
}

impl<N, M> TunnelServer<N, M>
where
    N: Negotiator<M>,
    M: Multiplexer,
{
    /// Creates a server with an empty registry.
    pub fn new(negotiator: N, config: SessionConfig) -> Self {
        Self {
            negotiator,
            registry: Arc::new(SessionMgr::new(config)),
        }
    }

    /// Creates a new builder.
    pub fn builder() -> TunnelServerBuilder {
        TunnelServerBuilder::new()
    }

    /// The token registry shared by every session of this server.
    pub fn registry(&self) -> &Arc<SessionMgr<M>> {
        &self.registry
    }

    /// Current counters.
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            outstanding_tokens: self.registry.len(),
        }
    }

    /// Negotiates one physical connection and, on success, spawns its
    /// session's data path.
    ///
    /// Returns once the handshake is over; the tunnel's lifetime runs on
    /// its own task. On failure the connection is closed and any tokens
    /// the half-built session was issued are revoked, even when the
    /// negotiator panicked after minting them.
    pub async fn tunnel_serve(&self, conn: M::Conn) {
        let peer = conn.remote_addr();
        let mut tun = TunnelConn::new(conn);

        let negotiated = AssertUnwindSafe(self.negotiator.negotiate(&mut tun, &self.registry))
            .catch_unwind()
            .await;

        match negotiated {
            Ok(Ok(Negotiated::NewSession(session))) => {
                spawn_data_tunnel(session, tun, None);
            }
            Ok(Ok(Negotiated::DataTunnel { session, token })) => {
                spawn_data_tunnel(session, tun, Some(token));
            }
            Ok(Err(Rejected { error, session })) => {
                tracing::warn!(%peer, error = %error, "closing abnormal connection");
                self.discard(tun, session).await;
            }
            Err(payload) => {
                report_panic("negotiation", &peer.to_string(), payload.as_ref());
                // The half-built session, if any, unwound with the handshake.
                if let Some(sid) = tun.session_id() {
                    let revoked = self.registry.revoke_session(sid);
                    tracing::debug!(%peer, sid, revoked, "revoked tokens of aborted session");
                }
                self.discard(tun, None).await;
            }
        }
    }

    /// Accepts connections from `transport` until the process ends.
    ///
    /// Each connection is negotiated on its own task, so a slow
    /// handshake never holds up the accept loop. Accept errors are
    /// logged and the loop carries on.
    pub async fn serve<T>(self: Arc<Self>, mut transport: T)
    where
        T: Transport<Connection = M::Conn>,
    {
        tracing::info!("tunnel server running");

        loop {
            match transport.accept().await {
                Ok(conn) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.tunnel_serve(conn).await;
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }

    async fn discard(&self, tun: TunnelConn<M::Conn>, session: Option<Arc<Session<M>>>) {
        let conn = tun.into_inner();
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "close after failed handshake");
        }
        if let Some(session) = session {
            let revoked = self.registry.clear_tokens(&session);
            tracing::debug!(client = %session.cid(), revoked, "discarded half-built session");
        }
    }
}

fn spawn_data_tunnel<M: Multiplexer>(
    session: Arc<Session<M>>,
    tun: TunnelConn<M::Conn>,
    token: Option<tunnel_protocol::Token>,
) {
    tokio::spawn(session.data_tun_serve(tun, token));
}

/// Builder for configuring and starting a TCP tunnel server.
///
/// # Example
///
/// ```rust,ignore
/// let server = TunnelServerBuilder::new()
///     .bind("0.0.0.0:9008")
///     .build::<_, MyMux>(my_handshake)
///     .await?;
/// server.run().await
/// ```
pub struct TunnelServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
}

impl TunnelServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:9008".to_string(),
            session_config: SessionConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Binds the TCP listener and builds the server around `negotiator`.
    pub async fn build<N, M>(self, negotiator: N) -> Result<ListeningServer<N, M>, TunnelError>
    where
        N: Negotiator<M>,
        M: Multiplexer<Conn = TcpConnection>,
    {
        let transport = TcpTransport::bind(&self.bind_addr).await?;
        let server = Arc::new(TunnelServer::new(negotiator, self.session_config));
        Ok(ListeningServer { transport, server })
    }
}

impl Default for TunnelServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound TCP tunnel server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ListeningServer<N, M: Multiplexer> {
    transport: TcpTransport,
    server: Arc<TunnelServer<N, M>>,
}

impl<N, M> ListeningServer<N, M>
where
    N: Negotiator<M>,
    M: Multiplexer<Conn = TcpConnection>,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the server, for stats while it runs.
    pub fn server(&self) -> Arc<TunnelServer<N, M>> {
        Arc::clone(&self.server)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) {
        self.server.serve(self.transport).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = TunnelServerBuilder::default();
        assert_eq!(builder.bind_addr, "127.0.0.1:9008");
        assert_eq!(
            builder.session_config.token_batch_size,
            SessionConfig::default().token_batch_size
        );
    }

    #[test]
    fn test_builder_overrides() {
        let config = SessionConfig {
            token_batch_size: 8,
            ..SessionConfig::default()
        };
        let builder = TunnelServerBuilder::new()
            .bind("0.0.0.0:7000")
            .session_config(config);
        assert_eq!(builder.bind_addr, "0.0.0.0:7000");
        assert_eq!(builder.session_config.token_batch_size, 8);
    }

    #[test]
    fn test_server_stats_serializes_as_object() {
        let stats = ServerStats {
            outstanding_tokens: 3,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(json, r#"{"outstanding_tokens":3}"#);
    }
}
