//! Wire protocol for Gatehouse.
//!
//! - **Types** ([`Frame`], [`Command`], [`UserId`], [`ChannelId`],
//!   [`SessionId`]): what travels between client, gatekeeper and broker.
//! - **Codec** ([`FrameCodec`], [`StompCodec`]): how frames become bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! ```text
//! Transport (bytes) → Protocol (Frame) → Session (caller identity)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{is_heartbeat, FrameCodec, StompCodec};
pub use error::ProtocolError;
pub use types::{header, ChannelId, Command, Frame, SessionId, UserId};
