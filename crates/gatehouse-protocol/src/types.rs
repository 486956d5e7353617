//! Core protocol types: identifiers and the control frame model.
//!
//! Frames follow STOMP 1.2: a command line, an ordered list of headers,
//! and an opaque body. Gatehouse only inspects the command and a handful
//! of headers; the body is never interpreted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Stable identifier of an account.
///
/// Newtype over `String` so a user id can't be passed where a channel id
/// is expected. Serializes as the bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Creates a user id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a private channel (the tail of a
/// `topic/private/<channel>` destination).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Creates a channel id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one connected session.
///
/// Generated by the session layer when the transport link is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Wraps an already-generated identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// The command tag of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // -- client frames --
    Connect,
    /// STOMP 1.2 alias for CONNECT.
    Stomp,
    Disconnect,
    Subscribe,
    Unsubscribe,
    Send,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    // -- server frames --
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// The wire spelling of this command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Disconnect => "DISCONNECT",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// `true` for both spellings of the connect command.
    pub fn is_connect(self) -> bool {
        matches!(self, Self::Connect | Self::Stomp)
    }

    /// Frames whose headers are never escaped on the wire.
    pub(crate) fn skips_header_escaping(self) -> bool {
        matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "DISCONNECT" => Self::Disconnect,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Header names
// ---------------------------------------------------------------------------

/// Header names Gatehouse reads or writes.
pub mod header {
    pub const AUTHORIZATION: &str = "Authorization";
    pub const DESTINATION: &str = "destination";
    pub const RECEIPT: &str = "receipt";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const MESSAGE: &str = "message";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const VERSION: &str = "version";
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A single protocol frame.
///
/// Headers keep wire order. Repeated headers are legal in STOMP and only
/// the first occurrence is significant, which is what [`Frame::header`]
/// returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Builder-style header append.
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.push_header(name, value);
        self
    }

    /// Builder-style body setter.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Appends a header, keeping any earlier value with the same name.
    pub fn push_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.headers.push((name.into(), value.into()));
    }

    /// Returns the first value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates headers in wire order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The `destination` header (SUBSCRIBE, SEND, MESSAGE).
    pub fn destination(&self) -> Option<&str> {
        self.header(header::DESTINATION)
    }

    /// The `receipt` header a client attaches when it wants a RECEIPT.
    pub fn receipt(&self) -> Option<&str> {
        self.header(header::RECEIPT)
    }

    /// Builds an ERROR frame carrying `message`. `receipt` is the
    /// `receipt` header of the offending frame, echoed as `receipt-id`.
    pub fn error(message: &str, receipt: Option<&str>) -> Self {
        let mut frame = Self::new(Command::Error)
            .with_header(header::MESSAGE, message)
            .with_header(header::CONTENT_TYPE, "text/plain");
        if let Some(receipt) = receipt {
            frame.push_header(header::RECEIPT_ID, receipt);
        }
        frame.with_body(message.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_round_trips_through_str() {
        for cmd in [
            Command::Connect,
            Command::Stomp,
            Command::Disconnect,
            Command::Subscribe,
            Command::Error,
        ] {
            assert_eq!(cmd.as_str().parse::<Command>().unwrap(), cmd);
        }
    }

    #[test]
    fn test_command_unknown_is_rejected() {
        let err = "PUBLISH".parse::<Command>().unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(c) if c == "PUBLISH"));
    }

    #[test]
    fn test_command_lowercase_is_rejected() {
        assert!("connect".parse::<Command>().is_err());
    }

    #[test]
    fn test_is_connect_covers_stomp_alias() {
        assert!(Command::Connect.is_connect());
        assert!(Command::Stomp.is_connect());
        assert!(!Command::Connected.is_connect());
    }

    #[test]
    fn test_header_returns_first_occurrence() {
        let frame = Frame::new(Command::Subscribe)
            .with_header("destination", "/topic/a")
            .with_header("destination", "/topic/b");
        assert_eq!(frame.destination(), Some("/topic/a"));
        assert_eq!(frame.headers().count(), 2);
    }

    #[test]
    fn test_header_lookup_is_case_sensitive() {
        let frame =
            Frame::new(Command::Connect).with_header("authorization", "x");
        assert_eq!(frame.header(header::AUTHORIZATION), None);
    }

    #[test]
    fn test_error_frame_echoes_receipt() {
        let cause = Frame::new(Command::Subscribe).with_header("receipt", "r-7");
        let err = Frame::error("duplicate", cause.receipt());
        assert_eq!(err.command, Command::Error);
        assert_eq!(err.header(header::MESSAGE), Some("duplicate"));
        assert_eq!(err.header(header::RECEIPT_ID), Some("r-7"));
        assert_eq!(err.body, b"duplicate");
    }

    #[test]
    fn test_error_frame_without_receipt_has_no_receipt_id() {
        let err = Frame::error("bad", None);
        assert_eq!(err.header(header::RECEIPT_ID), None);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&UserId::new("U1")).unwrap();
        assert_eq!(json, "\"U1\"");
        let back: ChannelId = serde_json::from_str("\"chan-42\"").unwrap();
        assert_eq!(back, ChannelId::new("chan-42"));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(UserId::new("U1").to_string(), "U1");
        assert_eq!(SessionId::new("ab12").to_string(), "S-ab12");
    }
}
