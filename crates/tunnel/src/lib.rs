//! # Tunnel
//!
//! Server-side session layer for an encrypted, multiplexed tunnel
//! protocol.
//!
//! A client's first connection completes a full handshake and becomes a
//! session. Further connections join that session by redeeming
//! single-use tokens, which the session hands out on request. When the
//! last connection of a session closes, its tokens are revoked and its
//! multiplexer torn down.
//!
//! The embedding application supplies the handshake ([`Negotiator`]),
//! the data path ([`Multiplexer`](tunnel_session::Multiplexer)) and the
//! cipher ([`CipherFactory`](tunnel_session::CipherFactory)).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tunnel::prelude::*;
//!
//! // Implement Negotiator and Multiplexer, then:
//! // let server = TunnelServerBuilder::new()
//! //     .bind("0.0.0.0:9008")
//! //     .build::<_, MyMux>(MyHandshake)
//! //     .await?;
//! // server.run().await
//! ```

mod error;
pub mod logging;
mod negotiation;
mod server;

pub use error::TunnelError;
pub use negotiation::{Negotiated, Negotiator, Rejected};
pub use server::{ListeningServer, ServerStats, TunnelServer, TunnelServerBuilder};

pub mod prelude {
    pub use crate::logging::init_tracing;
    pub use crate::{
        ListeningServer, Negotiated, Negotiator, Rejected, ServerStats,
        TunnelError, TunnelServer, TunnelServerBuilder,
    };
    pub use tunnel_protocol::{
        ControlEvent, FrameAction, Token, TokenBatch, TokenCommand,
        TOKEN_BATCH_SIZE, TOKEN_SIZE,
    };
    pub use tunnel_session::{
        CipherFactory, EventHandler, Handshake, Multiplexer, Session,
        SessionConfig, SessionError, SessionMgr, StreamCipher, TunnelConn,
    };
    pub use tunnel_transport::{
        Connection, ConnectionId, TcpConnection, TcpTransport, Transport,
        TransportError,
    };
}
