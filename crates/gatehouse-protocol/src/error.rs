//! Error types for the protocol layer.

/// Errors produced while decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Nothing but end-of-line bytes: a heart-beat, not a frame.
    #[error("empty frame")]
    Empty,

    /// The command line is not a known STOMP command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A header line has no `:` separator, or a header value is
    /// unusable (e.g. a non-numeric `content-length`).
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// A header contains an escape sequence STOMP doesn't define.
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),

    /// The frame ended before its NUL terminator.
    #[error("frame is missing its NUL terminator")]
    MissingTerminator,

    /// Anything else that breaks framing rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
