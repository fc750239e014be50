//! One authenticated client and the tunnels attached to it.
//!
//! A session is created when a full handshake completes. Further
//! physical connections join it by redeeming tokens, skipping the
//! handshake. The session goes offline the moment its last tunnel
//! detaches: its tokens are revoked and its multiplexer destroyed.
//!
//! ```text
//!   handshake ──→ Session::new ──→ data_tun_serve (×N tunnels)
//!                                        │
//!                         last tunnel detaches (active ≤ 0)
//!                                        ▼
//!                         clear_tokens + mux.destroy   [offline]
//! ```

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tunnel_protocol::{ControlEvent, FrameAction, Token, TokenCommand};
use tunnel_transport::Connection;

use crate::helpers::{report_panic, substring_before, IDENTITY_SEP};
use crate::{
    CipherFactory, EventHandler, Multiplexer, SessionError, SessionMgr,
    TunnelConn,
};

/// What a completed handshake hands to [`Session::new`].
pub struct Handshake<M: Multiplexer> {
    /// The registry the new session's tokens will live in.
    pub registry: Arc<SessionMgr<M>>,
    /// The identity the client claimed, `"<user>\0<rest>"`.
    pub client_identity: String,
}

/// Server-side state for one client identity.
pub struct Session<M: Multiplexer> {
    /// Handle to ourselves, for tasks spawned from `&self` callbacks.
    me: Weak<Session<M>>,
    /// Registry-unique serial, stamped on the handshake connection.
    sid: u64,
    mux: M,
    mgr: Arc<SessionMgr<M>>,
    /// User name, the claimed identity up to [`IDENTITY_SEP`].
    uid: String,
    /// `"<uid>@<ip>"` of the first tunnel, for logs.
    cid: String,
    cipher_factory: Arc<dyn CipherFactory>,
    /// Keys of this session's outstanding tokens. Only touched while
    /// the registry's write lock is held.
    pub(crate) tokens: Mutex<HashSet<String>>,
    /// Attached tunnels. The result of the decrement alone decides who
    /// is last out.
    active_cnt: AtomicI32,
    offline: AtomicBool,
}

impl<M: Multiplexer> Session<M> {
    /// Builds a session for the connection that just finished its
    /// handshake, assigning that connection its identifier.
    pub fn new(
        tun: &mut TunnelConn<M::Conn>,
        mux: M,
        cipher_factory: Arc<dyn CipherFactory>,
        handshake: Handshake<M>,
    ) -> Arc<Self> {
        let uid =
            substring_before(&handshake.client_identity, IDENTITY_SEP).to_string();
        identify(&uid, tun);
        let cid = format!("{uid}@{}", tun.conn().remote_addr().ip());
        let sid = handshake.registry.next_session_id();
        tun.bind_session(sid);

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            sid,
            mux,
            mgr: handshake.registry,
            uid,
            cid,
            cipher_factory,
            tokens: Mutex::new(HashSet::new()),
            active_cnt: AtomicI32::new(0),
            offline: AtomicBool::new(false),
        })
    }

    /// The user name.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The session's serial number within its registry.
    pub fn sid(&self) -> u64 {
        self.sid
    }

    /// The short client key, `"<uid>@<ip>"`.
    ///
    /// Only the IP of the first tunnel's peer is kept, never the port.
    /// IPv6 addresses appear unbracketed, e.g. `alice@2001:db8::7`.
    pub fn cid(&self) -> &str {
        &self.cid
    }

    /// The registry this session's tokens live in.
    pub fn registry(&self) -> &Arc<SessionMgr<M>> {
        &self.mgr
    }

    /// The session's multiplexer.
    pub fn mux(&self) -> &M {
        &self.mux
    }

    /// Number of tunnels currently attached. Diagnostic only.
    pub fn active_count(&self) -> i32 {
        self.active_cnt.load(Ordering::Acquire)
    }

    /// Returns `true` once the last tunnel has detached.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Number of tokens this session currently owns.
    pub fn outstanding_tokens(&self) -> usize {
        self.tokens.lock().len()
    }

    /// Returns the tunnel's identifier, `"<uid>@<remote-addr>"`,
    /// assigning it on first use.
    pub fn identify_conn<'a>(&self, tun: &'a mut TunnelConn<M::Conn>) -> &'a str {
        identify(&self.uid, tun)
    }

    /// Attaches a tunnel and serves it until it disconnects.
    ///
    /// With `token`, this is a fast-path reconnect: the tunnel's cipher
    /// is derived from the redeemed token. Without one, the handshake
    /// already keyed the tunnel and this is the session's first.
    ///
    /// Never panics: a panic inside the multiplexer is recovered and
    /// takes the same detach path as a clean disconnect.
    pub async fn data_tun_serve(
        self: Arc<Self>,
        mut tun: TunnelConn<M::Conn>,
        token: Option<Token>,
    ) {
        let tun_id = self.identify_conn(&mut tun).to_string();
        let attachment = Attachment::attach(Arc::clone(&self));

        let served = AssertUnwindSafe(self.serve(tun, token, &tun_id))
            .catch_unwind()
            .await;
        match served {
            Ok(Ok(())) => {
                tracing::debug!(tun = %tun_id, "tunnel disconnected");
            }
            Ok(Err(e)) => {
                tracing::debug!(tun = %tun_id, error = %e, "tunnel disconnected");
            }
            Err(payload) => report_panic("tunnel serving", &tun_id, payload.as_ref()),
        }

        drop(attachment);
    }

    async fn serve(
        &self,
        mut tun: TunnelConn<M::Conn>,
        token: Option<Token>,
        tun_id: &str,
    ) -> Result<(), M::Error> {
        if self.is_offline() {
            // Token redeemed just before the session went down.
            tracing::debug!(tun = %tun_id, client = %self.cid, "session already offline");
            return Ok(());
        }

        match token {
            Some(token) => tun.set_cipher(self.cipher_factory.new_cipher(&token)),
            None => tracing::info!(client = %self.cid, "client is online"),
        }
        tracing::debug!(tun = %tun_id, "tunnel established");

        let handler: Arc<dyn EventHandler> = match self.me.upgrade() {
            Some(me) => me,
            None => return Ok(()),
        };
        self.mux
            .listen(tun, handler, self.mgr.config().ping_interval)
            .await
    }

    /// Reacts to a packet on the token control channel.
    pub fn handle_token_command(self: &Arc<Self>, cmd: TokenCommand) {
        match cmd {
            TokenCommand::Request => self.reply_tokens(),
            TokenCommand::Reply(batch) => {
                tracing::warn!(
                    client = %self.cid,
                    command = batch.header(),
                    "unrecognized token command"
                );
            }
            TokenCommand::Unrecognized { command, packet } => {
                tracing::warn!(
                    client = %self.cid,
                    command,
                    packet = %hex::encode(&packet),
                    "unrecognized token command"
                );
            }
        }
    }

    /// Mints a batch of tokens and pushes it to the client.
    fn reply_tokens(self: &Arc<Self>) {
        let count = self.mgr.config().token_batch_size;
        match self.mgr.create_tokens(self, count) {
            Ok(mut batch) => {
                batch.set_action(FrameAction::TokenReply);
                self.mux.best_send(batch.into_bytes(), "replyTokens");
            }
            Err(e @ SessionError::Offline(_)) => {
                tracing::debug!(client = %self.cid, error = %e, "token request dropped");
            }
            Err(e) => {
                tracing::warn!(client = %self.cid, error = %e, "token request failed");
            }
        }
    }

    fn attach(&self) {
        self.active_cnt.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns `true` if this call took the session offline.
    fn detach(&self) -> bool {
        if self.active_cnt.fetch_sub(1, Ordering::AcqRel) > 1 {
            return false;
        }
        // A tunnel attached after an earlier teardown can bring the
        // count back to zero; the mux must still be destroyed only once.
        if self.offline.swap(true, Ordering::SeqCst) {
            return false;
        }
        let revoked = self.mgr.clear_tokens(self);
        self.mux.destroy();
        tracing::info!(client = %self.cid, revoked, "client is offline");
        true
    }
}

impl<M: Multiplexer> EventHandler for Session<M> {
    fn on_event(&self, event: ControlEvent) {
        match event {
            ControlEvent::Tokens(cmd) => {
                let Some(session) = self.me.upgrade() else {
                    return;
                };
                tokio::spawn(async move { session.handle_token_command(cmd) });
            }
            other => {
                tracing::debug!(client = %self.cid, event = ?other, "ignoring control event");
            }
        }
    }
}

fn identify<'a, C: Connection>(uid: &str, tun: &'a mut TunnelConn<C>) -> &'a str {
    tun.identify_with(|conn| format!("{uid}@{}", conn.remote_addr()))
}

/// Counts one attached tunnel for as long as it lives.
///
/// Dropping it detaches the tunnel on every exit path, including task
/// cancellation, and takes the session offline if it was the last one.
struct Attachment<M: Multiplexer> {
    session: Arc<Session<M>>,
}

impl<M: Multiplexer> Attachment<M> {
    fn attach(session: Arc<Session<M>>) -> Self {
        session.attach();
        Self { session }
    }
}

impl<M: Multiplexer> Drop for Attachment<M> {
    fn drop(&mut self) {
        self.session.detach();
    }
}
