//! A physical connection as seen by the session layer.

use tunnel_transport::Connection;

use crate::StreamCipher;

/// Wraps a physical connection with the state the session layer attaches
/// to it: a lazily assigned identifier and the bound stream cipher.
pub struct TunnelConn<C> {
    conn: C,
    identifier: Option<String>,
    cipher: Option<Box<dyn StreamCipher>>,
    /// Serial of the session whose handshake ran on this connection.
    session: Option<u64>,
}

impl<C: Connection> TunnelConn<C> {
    /// Wraps a freshly accepted connection. No identifier, no cipher.
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            identifier: None,
            cipher: None,
            session: None,
        }
    }

    /// The underlying connection.
    pub fn conn(&self) -> &C {
        &self.conn
    }

    /// Unwraps the underlying connection, dropping the cipher.
    pub fn into_inner(self) -> C {
        self.conn
    }

    /// The identifier, if one has been assigned.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Returns the identifier, assigning it with `make` on first use.
    /// Later calls return the first value regardless of `make`.
    pub fn identify_with(&mut self, make: impl FnOnce(&C) -> String) -> &str {
        let conn = &self.conn;
        self.identifier.get_or_insert_with(|| make(conn)).as_str()
    }

    /// Records that `sid` was created by a handshake on this connection.
    pub fn bind_session(&mut self, sid: u64) {
        self.session = Some(sid);
    }

    /// The session created on this connection, if any. Lets the server
    /// revoke a half-built session's tokens when the handshake dies.
    pub fn session_id(&self) -> Option<u64> {
        self.session
    }

    /// Binds a stream cipher, replacing any previous one.
    pub fn set_cipher(&mut self, cipher: Box<dyn StreamCipher>) {
        self.cipher = Some(cipher);
    }

    /// Returns `true` once a cipher has been bound.
    pub fn has_cipher(&self) -> bool {
        self.cipher.is_some()
    }

    /// The bound cipher, for the multiplexer's read/write loop.
    pub fn cipher_mut(&mut self) -> Option<&mut (dyn StreamCipher + 'static)> {
        self.cipher.as_deref_mut()
    }
}
