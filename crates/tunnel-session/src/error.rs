//! Error types for the session layer.

/// Errors that can occur while minting or redeeming tokens.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Every draw for a token slot collided with an outstanding token.
    /// The partially minted batch has been rolled back.
    #[error("token space exhausted after {attempts} draws")]
    TokenSpaceExhausted { attempts: u32 },

    /// The session's last connection is gone; it can't own new tokens.
    #[error("session {0} is offline")]
    Offline(String),

    /// The presented token is unknown, already redeemed, or revoked.
    /// Callers must treat this as an authentication failure.
    #[error("invalid or already redeemed token")]
    InvalidToken,
}
