//! Cipher construction hook.
//!
//! The session layer never implements a cipher. It only needs a way to
//! turn a redeemed token into the stream cipher for a new tunnel; the
//! server's crypto setup supplies that through [`CipherFactory`].

use tunnel_protocol::Token;

/// A keyed stream cipher bound to one physical connection.
pub trait StreamCipher: Send + 'static {
    /// Encrypts or decrypts `data` in place.
    fn apply_keystream(&mut self, data: &mut [u8]);
}

/// Builds per-tunnel stream ciphers for one user.
///
/// Shared immutably by every session of that user, so it must be
/// `Send + Sync`.
pub trait CipherFactory: Send + Sync + 'static {
    /// Derives a cipher keyed by `token`.
    ///
    /// Must be deterministic within a process run: the same token always
    /// yields the same keystream, because the client derives its side of
    /// the tunnel from the same bytes.
    fn new_cipher(&self, token: &Token) -> Box<dyn StreamCipher>;
}
