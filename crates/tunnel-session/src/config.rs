//! Session-layer settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tunnel_protocol::TOKEN_BATCH_SIZE;

/// Configuration for token minting and tunnel keepalive.
///
/// Every field has a default, so a partial document deserializes into a
/// complete config:
///
/// ```rust
/// use tunnel_session::SessionConfig;
///
/// let config = SessionConfig {
///     token_batch_size: 8,
///     ..SessionConfig::default()
/// };
/// assert_eq!(config.max_mint_attempts, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Tokens minted per token request.
    ///
    /// Default: 4.
    pub token_batch_size: usize,

    /// Keepalive interval handed to the multiplexer for every tunnel.
    ///
    /// Default: 5 seconds.
    pub ping_interval: Duration,

    /// Draws allowed per token slot before minting gives up with
    /// [`SessionError::TokenSpaceExhausted`](crate::SessionError::TokenSpaceExhausted).
    ///
    /// Default: 16. Values below 1 are treated as 1.
    pub max_mint_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_batch_size: TOKEN_BATCH_SIZE,
            ping_interval: Duration::from_secs(5),
            max_mint_attempts: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_protocol_batch_size() {
        let config = SessionConfig::default();

        assert_eq!(config.token_batch_size, 4);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_partial_document_fills_in_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "max_mint_attempts": 3 }"#)
                .expect("valid config");

        assert_eq!(config.max_mint_attempts, 3);
        assert_eq!(config.token_batch_size, TOKEN_BATCH_SIZE);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
    }
}
