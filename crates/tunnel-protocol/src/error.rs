//! Error types for the protocol layer.
//!
//! Each crate in the tunnel stack defines its own error enum. A
//! `ProtocolError` always means the bytes on the wire were malformed,
//! never that a session or a socket misbehaved.

/// Errors that can occur while parsing control payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Fewer bytes than a full token were supplied.
    #[error("token needs {expected} bytes, got {actual}")]
    ShortToken { expected: usize, actual: usize },

    /// A control packet arrived without a command byte.
    #[error("empty control packet")]
    EmptyPacket,

    /// A token batch body is not a whole number of tokens.
    #[error("token batch body of {0} bytes is not a multiple of the token size")]
    MisalignedBatch(usize),
}
