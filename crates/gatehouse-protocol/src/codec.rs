//! Frame codec: converts between [`Frame`] values and wire bytes.
//!
//! The [`FrameCodec`] trait keeps the rest of the stack independent of
//! the framing format. [`StompCodec`] implements STOMP 1.2 framing:
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! ...\n
//! \n
//! body\0
//! ```

use crate::types::header;
use crate::{Command, Frame, ProtocolError};

/// Encodes frames to bytes and decodes bytes back into frames.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task on the server.
pub trait FrameCodec: Send + Sync + 'static {
    /// Serializes a frame. Encoding a well-formed [`Frame`] cannot fail.
    fn encode(&self, frame: &Frame) -> Vec<u8>;

    /// Parses exactly one frame from `data`.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] describing the first framing rule the
    /// input breaks.
    fn decode(&self, data: &[u8]) -> Result<Frame, ProtocolError>;
}

/// Returns `true` if `data` is a STOMP heart-beat (only EOL bytes).
pub fn is_heartbeat(data: &[u8]) -> bool {
    data.iter().all(|b| is_eol(*b))
}

/// STOMP 1.2 text framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StompCodec;

impl FrameCodec for StompCodec {
    fn encode(&self, frame: &Frame) -> Vec<u8> {
        let raw = frame.command.skips_header_escaping();
        let mut out = Vec::with_capacity(64 + frame.body.len());
        out.extend_from_slice(frame.command.as_str().as_bytes());
        out.push(b'\n');

        let mut has_length = false;
        for (name, value) in frame.headers() {
            has_length |= name == header::CONTENT_LENGTH;
            push_escaped(&mut out, name, raw);
            out.push(b':');
            push_escaped(&mut out, value, raw);
            out.push(b'\n');
        }
        if !has_length && !frame.body.is_empty() {
            out.extend_from_slice(
                format!("{}:{}\n", header::CONTENT_LENGTH, frame.body.len())
                    .as_bytes(),
            );
        }

        out.push(b'\n');
        out.extend_from_slice(&frame.body);
        out.push(0);
        out
    }

    fn decode(&self, data: &[u8]) -> Result<Frame, ProtocolError> {
        // Heart-beat EOLs may precede a frame.
        let start = data
            .iter()
            .position(|b| !is_eol(*b))
            .ok_or(ProtocolError::Empty)?;
        let mut rest = &data[start..];

        let command: Command = next_line(&mut rest)?.parse()?;
        let raw = command.skips_header_escaping();
        let mut frame = Frame::new(command);

        loop {
            let line = next_line(&mut rest)?;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
            if raw {
                frame.push_header(name, value);
            } else {
                frame.push_header(unescape(name)?, unescape(value)?);
            }
        }

        let body = match frame.header(header::CONTENT_LENGTH) {
            Some(value) => {
                let len: usize = value.trim().parse().map_err(|_| {
                    ProtocolError::MalformedHeader(format!(
                        "{}:{value}",
                        header::CONTENT_LENGTH
                    ))
                })?;
                if rest.len() <= len || rest[len] != 0 {
                    return Err(ProtocolError::MissingTerminator);
                }
                let body = rest[..len].to_vec();
                rest = &rest[len + 1..];
                body
            }
            None => {
                let nul = rest
                    .iter()
                    .position(|b| *b == 0)
                    .ok_or(ProtocolError::MissingTerminator)?;
                let body = rest[..nul].to_vec();
                rest = &rest[nul + 1..];
                body
            }
        };

        if !is_heartbeat(rest) {
            return Err(ProtocolError::InvalidMessage(
                "trailing data after frame terminator".into(),
            ));
        }

        frame.body = body;
        Ok(frame)
    }
}

fn is_eol(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// Splits off the next `\n`-terminated line, dropping an optional `\r`.
fn next_line<'a>(rest: &mut &'a [u8]) -> Result<&'a str, ProtocolError> {
    let pos = rest.iter().position(|b| *b == b'\n').ok_or_else(|| {
        ProtocolError::InvalidMessage("frame header section is truncated".into())
    })?;
    let mut line = &rest[..pos];
    if let [head @ .., b'\r'] = line {
        line = head;
    }
    *rest = &rest[pos + 1..];
    std::str::from_utf8(line).map_err(|_| {
        ProtocolError::InvalidMessage("frame header section is not UTF-8".into())
    })
}

fn push_escaped(out: &mut Vec<u8>, s: &str, raw: bool) {
    if raw {
        out.extend_from_slice(s.as_bytes());
        return;
    }
    for ch in s.chars() {
        match ch {
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            ':' => out.extend_from_slice(b"\\c"),
            other => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn unescape(s: &str) -> Result<String, ProtocolError> {
    if !s.contains('\\') {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            _ => return Err(ProtocolError::InvalidEscape(s.to_string())),
        }
    }
    Ok(out)
}
