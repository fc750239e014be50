//! Wire-level vocabulary of the tunnel session layer.
//!
//! - **Tokens** ([`Token`]): 20-byte single-use reconnection credentials.
//! - **Framing** ([`TokenBatch`], [`TokenCommand`], [`FrameAction`]): how
//!   token requests and replies look on the multiplexer's control channel.
//! - **Events** ([`ControlEvent`]): what the multiplexer hands to a
//!   session when a control packet arrives.
//!
//! ```text
//! Transport (bytes) → Protocol (tokens, control events) → Session
//! ```
//!
//! The multiplexer's data frame format is not defined here.

mod error;
mod frame;
mod token;

pub use error::ProtocolError;
pub use frame::{
    ControlEvent, FrameAction, TokenBatch, TokenCommand, PARALLEL_TUN_QTY,
    TOKEN_BATCH_SIZE, TOKENS_FLOOR,
};
pub use token::{Token, TOKEN_SIZE};
