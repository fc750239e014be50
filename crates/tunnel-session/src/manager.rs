//! The token registry: which outstanding token belongs to which session.
//!
//! Tokens are minted in batches on client request, redeemed exactly once
//! when a new tunnel presents one, and revoked wholesale when their
//! session goes offline.
//!
//! # Locking
//!
//! One `RwLock` guards the whole registry. Minting, redemption, and
//! revocation all take it exclusively, since each of them mutates. A
//! session's own token set is locked only while the registry lock is
//! held, always in that order, so the two maps change together. No I/O
//! ever happens under either lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tunnel_protocol::{Token, TokenBatch, TOKEN_SIZE};

use crate::{Multiplexer, Session, SessionConfig, SessionError};

/// Registry of outstanding reconnection tokens.
///
/// Every key in a session's token set is also in `container`, pointing
/// back to that session, and vice versa. A token is either outstanding
/// in both maps or gone from both.
pub struct SessionMgr<M: Multiplexer> {
    registry: RwLock<Registry<M>>,
    config: SessionConfig,
    next_sid: AtomicU64,
}

struct Registry<M: Multiplexer> {
    /// Hex token key → owning session.
    container: HashMap<String, Arc<Session<M>>>,
    source: TokenSource,
}

impl<M: Multiplexer> SessionMgr<M> {
    /// Creates an empty registry. The nonce generator is seeded from the
    /// OS once, here.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_source(config, TokenSource::Random(StdRng::from_os_rng()))
    }

    fn with_source(config: SessionConfig, source: TokenSource) -> Self {
        Self {
            registry: RwLock::new(Registry {
                container: HashMap::new(),
                source,
            }),
            config,
            next_sid: AtomicU64::new(1),
        }
    }

    /// The session-layer configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Mints `count` fresh tokens for `session` and registers them.
    ///
    /// The returned batch is framed `[header][token]×count` with a zero
    /// header for the caller to stamp. Minting and registration happen in
    /// one critical section; nobody observes half a batch.
    ///
    /// # Errors
    /// - [`SessionError::Offline`]: the session has already been torn
    ///   down and must not own tokens again
    /// - [`SessionError::TokenSpaceExhausted`]: a slot collided
    ///   `max_mint_attempts` times; nothing from this call stays
    ///   registered
    pub fn create_tokens(
        &self,
        session: &Arc<Session<M>>,
        count: usize,
    ) -> Result<TokenBatch, SessionError> {
        let mut guard = self.registry.write();
        if session.is_offline() {
            return Err(SessionError::Offline(session.cid().to_string()));
        }
        let Registry { container, source } = &mut *guard;
        let mut owned = session.tokens.lock();

        let max_attempts = self.config.max_mint_attempts.max(1);
        let mut batch = TokenBatch::with_capacity(count);
        let mut minted = Vec::with_capacity(count);

        for _ in 0..count {
            let mut attempts = 0;
            let (token, key) = loop {
                if attempts == max_attempts {
                    for key in &minted {
                        container.remove(key);
                        owned.remove(key);
                    }
                    return Err(SessionError::TokenSpaceExhausted { attempts });
                }
                attempts += 1;
                let token = source.draw(session.uid());
                let key = token.key();
                if !container.contains_key(&key) {
                    break (token, key);
                }
                tracing::trace!(client = %session.cid(), "token collision, redrawing");
            };
            container.insert(key.clone(), Arc::clone(session));
            owned.insert(key.clone());
            minted.push(key);
            batch.push(&token);
        }

        tracing::trace!(
            client = %session.cid(),
            created = count,
            outstanding = container.len(),
            "tokens created"
        );
        Ok(batch)
    }

    /// Redeems `token`, returning its session.
    ///
    /// Single use: the token leaves both maps here, so of any number of
    /// concurrent callers presenting the same token at most one gets the
    /// session back.
    pub fn take(&self, token: &Token) -> Option<Arc<Session<M>>> {
        let key = token.key();
        let mut guard = self.registry.write();
        let session = guard.container.remove(&key)?;
        session.tokens.lock().remove(&key);
        Some(session)
    }

    /// Like [`take`](Self::take), but a miss is an error.
    ///
    /// # Errors
    /// [`SessionError::InvalidToken`] if the token is not outstanding.
    pub fn redeem(&self, token: &Token) -> Result<Arc<Session<M>>, SessionError> {
        self.take(token).ok_or(SessionError::InvalidToken)
    }

    /// Revokes every token `session` owns. Returns how many there were.
    pub fn clear_tokens(&self, session: &Session<M>) -> usize {
        let mut guard = self.registry.write();
        let mut owned = session.tokens.lock();
        let revoked = owned.len();
        for key in owned.drain() {
            guard.container.remove(&key);
        }
        revoked
    }

    /// Revokes every token of the session with serial `sid`.
    ///
    /// For when the handshake that built a session blew up before the
    /// server ever saw the `Arc<Session>`. Returns how many tokens there
    /// were; zero if the session owns none.
    pub fn revoke_session(&self, sid: u64) -> usize {
        let mut guard = self.registry.write();
        let Some(session) = guard
            .container
            .values()
            .find(|session| session.sid() == sid)
            .cloned()
        else {
            return 0;
        };
        let mut owned = session.tokens.lock();
        let revoked = owned.len();
        for key in owned.drain() {
            guard.container.remove(&key);
        }
        revoked
    }

    pub(crate) fn next_session_id(&self) -> u64 {
        self.next_sid.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of outstanding tokens across all sessions.
    pub fn len(&self) -> usize {
        self.registry.read().container.len()
    }

    /// Returns `true` if no tokens are outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where token bytes come from.
enum TokenSource {
    Random(StdRng),
    #[cfg(test)]
    Scripted(std::vec::IntoIter<Token>),
}

impl TokenSource {
    fn draw(&mut self, uid: &str) -> Token {
        match self {
            Self::Random(rng) => derive_token(uid, rng.random::<u64>(), unix_nanos()),
            #[cfg(test)]
            Self::Scripted(tokens) => tokens.next().expect("token script exhausted"),
        }
    }
}

/// `BLAKE3(uid ‖ nonce ‖ nanos)`, truncated to [`TOKEN_SIZE`] bytes.
fn derive_token(uid: &str, nonce: u64, nanos: u64) -> Token {
    let mut hasher = blake3::Hasher::new();
    hasher.update(uid.as_bytes());
    hasher.update(&nonce.to_be_bytes());
    hasher.update(&nanos.to_be_bytes());
    let mut bytes = [0u8; TOKEN_SIZE];
    hasher.finalize_xof().fill(&mut bytes);
    Token::new(bytes)
}

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionMgr`.
    //!
    //! Naming: `test_{function}_{scenario}_{expected}`.
    //!
    //! Collision handling is tested with a scripted token source, so the
    //! "random" draws are known in advance.

    use std::collections::HashSet;

    use super::*;
    use crate::testing::{new_session, NullMux};

    // -- Helpers ----------------------------------------------------------

    fn registry() -> Arc<SessionMgr<NullMux>> {
        Arc::new(SessionMgr::new(SessionConfig::default()))
    }

    fn scripted(max_mint_attempts: u32, tokens: Vec<Token>) -> Arc<SessionMgr<NullMux>> {
        let config = SessionConfig {
            max_mint_attempts,
            ..SessionConfig::default()
        };
        Arc::new(SessionMgr::with_source(
            config,
            TokenSource::Scripted(tokens.into_iter()),
        ))
    }

    fn tok(fill: u8) -> Token {
        Token::new([fill; TOKEN_SIZE])
    }

    // =====================================================================
    // create_tokens()
    // =====================================================================

    #[test]
    fn test_create_tokens_registers_batch_in_both_maps() {
        let mgr = registry();
        let (session, _) = new_session(&mgr, "alice");

        let batch = mgr.create_tokens(&session, 4).expect("should mint");

        assert_eq!(batch.len(), 4);
        assert_eq!(batch.as_bytes().len(), 1 + 4 * TOKEN_SIZE);
        assert_eq!(batch.header(), 0, "header is left for the caller");
        assert_eq!(mgr.len(), 4);
        assert_eq!(session.outstanding_tokens(), 4);
    }

    #[test]
    fn test_create_tokens_many_batches_never_share_a_key() {
        let mgr = registry();
        let (alice, _) = new_session(&mgr, "alice");
        let (bob, _) = new_session(&mgr, "bob");

        let mut keys = HashSet::new();
        for _ in 0..32 {
            for session in [&alice, &bob] {
                let batch = mgr.create_tokens(session, 4).unwrap();
                for token in batch.tokens() {
                    assert!(keys.insert(token.key()), "duplicate token minted");
                }
            }
        }

        assert_eq!(mgr.len(), 256);
        assert_eq!(alice.outstanding_tokens() + bob.outstanding_tokens(), 256);
    }

    #[test]
    fn test_create_tokens_collision_is_redrawn() {
        let mgr = scripted(4, vec![tok(1), tok(1), tok(2)]);
        let (session, _) = new_session(&mgr, "alice");

        let batch = mgr.create_tokens(&session, 2).expect("should mint");

        let tokens: Vec<Token> = batch.tokens().collect();
        assert_eq!(tokens, vec![tok(1), tok(2)]);
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn test_create_tokens_exhausted_rolls_back_batch() {
        let mgr = scripted(2, vec![tok(1), tok(1), tok(1)]);
        let (session, _) = new_session(&mgr, "alice");

        let result = mgr.create_tokens(&session, 2);

        assert!(matches!(
            result,
            Err(SessionError::TokenSpaceExhausted { attempts: 2 })
        ));
        assert!(mgr.is_empty(), "partial batch must not stay registered");
        assert_eq!(session.outstanding_tokens(), 0);
    }

    #[test]
    fn test_create_tokens_zero_count_returns_bare_header() {
        let mgr = registry();
        let (session, _) = new_session(&mgr, "alice");

        let batch = mgr.create_tokens(&session, 0).unwrap();

        assert_eq!(batch.as_bytes(), &[0]);
        assert!(mgr.is_empty());
    }

    // =====================================================================
    // take() / redeem()
    // =====================================================================

    #[test]
    fn test_take_redeems_exactly_once() {
        let mgr = registry();
        let (session, _) = new_session(&mgr, "alice");
        let batch = mgr.create_tokens(&session, 4).unwrap();
        let tokens: Vec<Token> = batch.tokens().collect();

        let owner = mgr.take(&tokens[2]).expect("outstanding token");

        assert!(Arc::ptr_eq(&owner, &session));
        assert_eq!(mgr.len(), 3);
        assert_eq!(session.outstanding_tokens(), 3);
        assert!(!session.tokens.lock().contains(&tokens[2].key()));

        assert!(mgr.take(&tokens[2]).is_none(), "second take must miss");
        assert_eq!(mgr.len(), 3);
    }

    #[test]
    fn test_take_unknown_token_returns_none() {
        let mgr = registry();

        assert!(mgr.take(&tok(9)).is_none());
    }

    #[test]
    fn test_redeem_miss_is_invalid_token() {
        let mgr = registry();

        assert!(matches!(mgr.redeem(&tok(9)), Err(SessionError::InvalidToken)));
    }

    #[test]
    fn test_take_concurrent_callers_one_winner() {
        let mgr = registry();
        let (session, _) = new_session(&mgr, "alice");
        let batch = mgr.create_tokens(&session, 1).unwrap();
        let token = batch.tokens().next().unwrap();

        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| mgr.take(&token).is_some()))
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });

        assert_eq!(winners, 1);
        assert!(mgr.is_empty());
    }

    // =====================================================================
    // clear_tokens()
    // =====================================================================

    #[test]
    fn test_clear_tokens_revokes_only_that_session() {
        let mgr = registry();
        let (alice, _) = new_session(&mgr, "alice");
        let (bob, _) = new_session(&mgr, "bob");
        let alice_batch = mgr.create_tokens(&alice, 4).unwrap();
        mgr.create_tokens(&bob, 4).unwrap();

        let revoked = mgr.clear_tokens(&alice);

        assert_eq!(revoked, 4);
        assert_eq!(alice.outstanding_tokens(), 0);
        assert_eq!(bob.outstanding_tokens(), 4);
        assert_eq!(mgr.len(), 4);
        for token in alice_batch.tokens() {
            assert!(mgr.take(&token).is_none(), "revoked token redeemed");
        }
    }

    #[test]
    fn test_clear_tokens_twice_second_is_noop() {
        let mgr = registry();
        let (session, _) = new_session(&mgr, "alice");
        mgr.create_tokens(&session, 2).unwrap();

        assert_eq!(mgr.clear_tokens(&session), 2);
        assert_eq!(mgr.clear_tokens(&session), 0);
    }

    // =====================================================================
    // revoke_session()
    // =====================================================================

    #[test]
    fn test_revoke_session_by_serial_drops_only_its_tokens() {
        let mgr = registry();
        let (alice, alice_tun) = new_session(&mgr, "alice");
        let (bob, _) = new_session(&mgr, "bob");
        let alice_batch = mgr.create_tokens(&alice, 4).unwrap();
        mgr.create_tokens(&bob, 4).unwrap();
        let sid = alice_tun.session_id().expect("handshake stamps the conn");
        drop(alice);

        assert_eq!(mgr.revoke_session(sid), 4);

        assert_eq!(mgr.len(), 4);
        assert_eq!(bob.outstanding_tokens(), 4);
        for token in alice_batch.tokens() {
            assert!(mgr.take(&token).is_none(), "revoked token redeemed");
        }
    }

    #[test]
    fn test_revoke_session_without_tokens_is_noop() {
        let mgr = registry();
        let (session, _) = new_session(&mgr, "alice");

        assert_eq!(mgr.revoke_session(session.sid()), 0);
        assert_eq!(mgr.revoke_session(u64::MAX), 0);
    }

    // =====================================================================
    // derive_token()
    // =====================================================================

    #[test]
    fn test_derive_token_depends_on_every_input() {
        let base = derive_token("alice", 1, 100);

        assert_eq!(base, derive_token("alice", 1, 100));
        assert_ne!(base, derive_token("bob", 1, 100));
        assert_ne!(base, derive_token("alice", 2, 100));
        assert_ne!(base, derive_token("alice", 1, 101));
    }
}
