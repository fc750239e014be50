//! The reconnection token: 20 opaque bytes on the wire, lowercase hex
//! inside the server.

use std::fmt;

use crate::ProtocolError;

/// Size of a token in bytes.
pub const TOKEN_SIZE: usize = 20;

/// A single-use credential that binds a new physical connection to an
/// existing session without repeating the handshake.
///
/// The token doubles as key material: the session derives the
/// connection's stream cipher from it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token([u8; TOKEN_SIZE]);

impl Token {
    /// Wraps raw token bytes.
    pub fn new(bytes: [u8; TOKEN_SIZE]) -> Self {
        Self(bytes)
    }

    /// Reads a token from the first [`TOKEN_SIZE`] bytes of `buf`.
    ///
    /// Trailing bytes are ignored; clients may append handshake data
    /// after the token.
    ///
    /// # Errors
    /// [`ProtocolError::ShortToken`] if `buf` is shorter than a token.
    pub fn from_slice(buf: &[u8]) -> Result<Self, ProtocolError> {
        let head = buf.get(..TOKEN_SIZE).ok_or(ProtocolError::ShortToken {
            expected: TOKEN_SIZE,
            actual: buf.len(),
        })?;
        let mut bytes = [0u8; TOKEN_SIZE];
        bytes.copy_from_slice(head);
        Ok(Self(bytes))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; TOKEN_SIZE] {
        &self.0
    }

    /// Lowercase hex encoding, used as the registry key.
    pub fn key(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; TOKEN_SIZE]> for Token {
    fn from(bytes: [u8; TOKEN_SIZE]) -> Self {
        Self(bytes)
    }
}

// Tokens are credentials: only a short prefix ever reaches the logs.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({}..)", hex::encode(&self.0[..4]))
    }
}
