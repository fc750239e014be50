//! Session layer of the tunnel server.
//!
//! This crate tracks which client session each physical connection
//! belongs to:
//!
//! 1. **Sessions** ([`Session`]): one per authenticated client, with any
//!    number of attached tunnels and one multiplexer
//! 2. **Token registry** ([`SessionMgr`]): single-use reconnection tokens
//!    that let extra tunnels join a session without a new handshake
//! 3. **Collaborator seams** ([`Multiplexer`], [`CipherFactory`]): the
//!    data path and cipher construction, implemented elsewhere
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)     ← runs the handshake, hands tunnels to sessions
//!     ↕
//! Session Layer (this crate)  ← session lifecycle and token registry
//!     ↕
//! Protocol / Transport (below)  ← tokens, control events, connections
//! ```

mod cipher;
mod config;
mod conn;
mod error;
pub mod helpers;
mod manager;
mod mux;
mod session;
#[cfg(test)]
mod testing;

pub use cipher::{CipherFactory, StreamCipher};
pub use config::SessionConfig;
pub use conn::TunnelConn;
pub use error::SessionError;
pub use manager::SessionMgr;
pub use mux::{EventHandler, Multiplexer};
pub use session::{Handshake, Session};
