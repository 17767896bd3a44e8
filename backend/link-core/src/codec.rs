use crate::cipher::CipherState;
use crate::error::session::SessionError;
use crate::{LINE_TERMINATOR, MESSAGE_PREAMBLE};

use std::io;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

const PREVIEW_CHARS: usize = 60;

/// Longest inbound line accepted, terminator included.
pub const MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRead {
    /// The stream ended before any byte arrived.
    Closed,
    Line,
    /// `MAX_LINE_LEN` bytes arrived without a newline.
    TooLong,
}

/// Appends one `\n`-terminated line to `buffer`, reading at most
/// [`MAX_LINE_LEN`] bytes. Data cut off by end of stream counts as a line.
pub async fn read_line<R>(reader: &mut R, buffer: &mut Vec<u8>) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let read = (&mut *reader)
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', buffer)
        .await?;

    if read == 0 {
        Ok(LineRead::Closed)
    } else if read >= MAX_LINE_LEN && !buffer.ends_with(b"\n") {
        Ok(LineRead::TooLong)
    } else {
        Ok(LineRead::Line)
    }
}

/// Encrypts `plaintext` and frames it as one base64 line ending in CRLF.
pub fn encode_line(cipher: &mut CipherState, plaintext: &str) -> String {
    let encrypted = cipher.apply_to_vec(plaintext.as_bytes());
    let mut line = STANDARD.encode(encrypted);
    line.push_str(LINE_TERMINATOR);
    line
}

/// Decodes one received line. Surrounding whitespace is ignored.
///
/// A base64 failure is reported as [`SessionError::Desync`]: the keystream
/// has not been advanced for the line, so nothing after it can be trusted.
pub fn decode_line(cipher: &mut CipherState, wire: &str) -> Result<String, SessionError> {
    let trimmed = wire.trim();
    let mut bytes = STANDARD.decode(trimmed).map_err(|e| {
        SessionError::desync(format!("Invalid base64 line ({e}): {}", preview(trimmed)))
    })?;
    cipher.apply(&mut bytes);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// A decrypted `MP-0 ` message split into its tag and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub tag: char,
    pub payload: &'a str,
}

pub fn split_frame(decoded: &str) -> Result<Frame<'_>, SessionError> {
    let rest = decoded.strip_prefix(MESSAGE_PREAMBLE).ok_or_else(|| {
        SessionError::protocol_decode(format!("Unexpected message: {}", preview(decoded)))
    })?;

    let mut chars = rest.chars();
    let tag = chars.next().ok_or_else(|| {
        SessionError::protocol_decode(format!("Message without tag: {}", preview(decoded)))
    })?;

    Ok(Frame {
        tag,
        payload: chars.as_str().trim_end_matches(['\r', '\n']),
    })
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
