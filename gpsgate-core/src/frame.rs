//! Split a tracker byte stream into individual frames.
//!
//! TCP delivers bytes, and trackers do not agree on a terminator:
//! - `*HQ,...#`           ends at `#`
//! - `(...BP05)`          login frames end at `)`
//! - everything else      ends at `;` or a line break
//!
//! Command heartbeats start with `##`, so `#` only terminates frames that
//! opened with `*`.

use crate::types::{GatewayError, Result};

/// Longest frame accepted before the connection is considered garbage.
pub const MAX_FRAME_LEN: usize = 1024;

/// Login marker sent by TK103-family devices right after connecting.
pub const LOGIN_MARKER: &str = "BP05";

/// Reply acknowledging a login frame.
pub const LOGIN_REPLY: &str = "(AP05)";

/// Locate the next complete frame in `buf`.
///
/// Returns `Some((start, end, consumed))`: the frame is `buf[start..end]`
/// and `consumed` bytes can be dropped from the buffer. Returns `Ok(None)`
/// when more bytes are needed.
pub fn split_frame(buf: &[u8]) -> Result<Option<(usize, usize, usize)>> {
    let start = match buf.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(s) => s,
        None => return Ok(None),
    };
    let body = &buf[start..];

    let found = match body[0] {
        b'*' => body.iter().position(|&b| b == b'#').map(|i| (i + 1, i + 1)),
        b'(' => body.iter().position(|&b| b == b')').map(|i| (i + 1, i + 1)),
        _ => body
            .iter()
            .position(|&b| b == b';' || b == b'\n' || b == b'\r')
            .map(|i| {
                if body[i] == b';' {
                    (i + 1, i + 1)
                } else {
                    (i, i + 1)
                }
            }),
    };

    match found {
        Some((end, consumed)) if end <= MAX_FRAME_LEN => {
            Ok(Some((start, start + end, start + consumed)))
        }
        Some(_) => Err(GatewayError::FrameTooLong(MAX_FRAME_LEN)),
        None if body.len() > MAX_FRAME_LEN => Err(GatewayError::FrameTooLong(MAX_FRAME_LEN)),
        None => Ok(None),
    }
}

/// Split a complete buffer (e.g. a file or a closed stream) into frames.
///
/// Trailing bytes without a terminator form the last frame.
pub fn split_all(text: &str) -> Vec<&str> {
    let mut frames = Vec::new();
    let mut rest = text;
    loop {
        match split_frame(rest.as_bytes()) {
            Ok(Some((start, end, consumed))) => {
                frames.push(&rest[start..end]);
                rest = &rest[consumed..];
            }
            _ => {
                let tail = rest.trim();
                if !tail.is_empty() {
                    frames.push(tail);
                }
                return frames;
            }
        }
    }
}

/// Reply owed to the device for `frame`, if any.
pub fn login_reply(frame: &str) -> Option<&'static str> {
    if frame.contains(LOGIN_MARKER) {
        Some(LOGIN_REPLY)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
