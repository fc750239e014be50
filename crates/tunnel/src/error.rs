//! Unified error type for the tunnel server.

use tunnel_protocol::ProtocolError;
use tunnel_session::SessionError;
use tunnel_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each layer's variant lets `?` convert
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed bytes on the wire.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (token minting, redemption).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The handshake was refused or broke off.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The tracing subscriber could not be installed.
    #[error("logging setup failed: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::AcceptFailed(std::io::Error::new(
            std::io::ErrorKind::Other,
            "gone",
        ));
        let tunnel_err: TunnelError = err.into();
        assert!(matches!(tunnel_err, TunnelError::Transport(_)));
        assert!(tunnel_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::EmptyPacket;
        let tunnel_err: TunnelError = err.into();
        assert!(matches!(tunnel_err, TunnelError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let tunnel_err: TunnelError = SessionError::InvalidToken.into();
        assert!(matches!(
            tunnel_err,
            TunnelError::Session(SessionError::InvalidToken)
        ));
    }
}
