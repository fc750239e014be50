//! Control-event framing for token requests and replies.
//!
//! Token traffic rides the multiplexer's control channel, out of band
//! from bulk data. A packet is one command byte, optionally followed by
//! a body:
//!
//! ```text
//! request:  [TOKEN_REQUEST]
//! reply:    [TOKEN_REPLY][token 20B][token 20B]...
//! ```

use crate::{ProtocolError, Token, TOKEN_SIZE};

/// Number of tokens minted per token request.
pub const TOKEN_BATCH_SIZE: usize = 4;

/// Clients ask for more tokens once their stock drops to this level.
pub const TOKENS_FLOOR: usize = 2;

/// Number of parallel data tunnels a client keeps per session.
pub const PARALLEL_TUN_QTY: usize = 2;

/// Command byte of a token control packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameAction {
    /// Client asks the server for a fresh batch of tokens.
    TokenRequest = 0x0b,
    /// Server pushes a batch of tokens to the client.
    TokenReply = 0x0c,
}

impl FrameAction {
    /// The wire value of this command.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FrameAction {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        match code {
            0x0b => Ok(Self::TokenRequest),
            0x0c => Ok(Self::TokenReply),
            other => Err(other),
        }
    }
}

/// A framed batch of tokens: one header byte followed by N tokens.
///
/// The header starts as a zero placeholder; whoever sends the batch
/// stamps it with the action code via [`set_action`](Self::set_action).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    buf: Vec<u8>,
}

impl TokenBatch {
    /// Length of the header in bytes.
    pub const HEADER_LEN: usize = 1;

    /// Creates an empty batch with room for `count` tokens.
    pub fn with_capacity(count: usize) -> Self {
        let mut buf = Vec::with_capacity(Self::HEADER_LEN + count * TOKEN_SIZE);
        buf.push(0);
        Self { buf }
    }

    /// Appends a token to the batch.
    pub fn push(&mut self, token: &Token) {
        self.buf.extend_from_slice(token.as_bytes());
    }

    /// Overwrites the header byte.
    pub fn set_action(&mut self, action: FrameAction) {
        self.buf[0] = action.code();
    }

    /// The raw header byte.
    pub fn header(&self) -> u8 {
        self.buf[0]
    }

    /// Number of tokens in the batch.
    pub fn len(&self) -> usize {
        (self.buf.len() - Self::HEADER_LEN) / TOKEN_SIZE
    }

    /// Returns `true` if the batch carries no tokens.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the tokens in wire order.
    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.buf[Self::HEADER_LEN..]
            .chunks_exact(TOKEN_SIZE)
            .filter_map(|chunk| Token::from_slice(chunk).ok())
    }

    /// The framed bytes, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the batch, returning the framed bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Parses a framed batch received from the wire.
    ///
    /// # Errors
    /// - [`ProtocolError::EmptyPacket`]: no header byte
    /// - [`ProtocolError::MisalignedBatch`]: body is not whole tokens
    pub fn decode(packet: &[u8]) -> Result<Self, ProtocolError> {
        let body = packet
            .get(Self::HEADER_LEN..)
            .ok_or(ProtocolError::EmptyPacket)?;
        if body.len() % TOKEN_SIZE != 0 {
            return Err(ProtocolError::MisalignedBatch(body.len()));
        }
        Ok(Self {
            buf: packet.to_vec(),
        })
    }
}

/// A parsed token control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCommand {
    /// The peer wants a fresh batch of tokens.
    Request,
    /// The peer sent a batch of tokens.
    Reply(TokenBatch),
    /// A command byte this build doesn't know. Kept for logging; newer
    /// peers may send commands older servers should skip.
    Unrecognized { command: u8, packet: Vec<u8> },
}

impl TokenCommand {
    /// Parses a token control packet by its leading command byte.
    ///
    /// # Errors
    /// [`ProtocolError::EmptyPacket`] if there is no command byte, or
    /// any error from [`TokenBatch::decode`] for a malformed reply.
    pub fn parse(packet: &[u8]) -> Result<Self, ProtocolError> {
        let command = *packet.first().ok_or(ProtocolError::EmptyPacket)?;
        match FrameAction::try_from(command) {
            Ok(FrameAction::TokenRequest) => Ok(Self::Request),
            Ok(FrameAction::TokenReply) => {
                Ok(Self::Reply(TokenBatch::decode(packet)?))
            }
            Err(command) => Ok(Self::Unrecognized {
                command,
                packet: packet.to_vec(),
            }),
        }
    }
}

/// Out-of-band events the multiplexer delivers to the owning session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ControlEvent {
    /// A packet on the token control channel.
    Tokens(TokenCommand),
}
