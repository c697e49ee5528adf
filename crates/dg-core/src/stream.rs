//! Framed envelope I/O: one header line, a blank separator line, then
//! length/index-prefixed ciphertext frames.
//!
//! ```text
//! <canonical header JSON> "\n\n"
//! [ u32_be(length) || u32_be(index) || length bytes ]*
//! ```
//!
//! The index is redundant with position but guards against frame reordering.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

use crate::error::{DgError, Result};
use crate::header::FileHeader;

pub const HEADER_SEPARATOR: &[u8; 2] = b"\n\n";
const FRAME_HEADER_LEN: usize = 8;

/// Emit the canonical header line plus separator.
pub fn write_header<W: Write>(out: &mut W, header: &FileHeader) -> Result<()> {
    out.write_all(header.to_json()?.as_bytes())?;
    out.write_all(HEADER_SEPARATOR)?;
    Ok(())
}

/// Frame layout: u32_be(length) || u32_be(index) || payload.
pub fn write_frame<W: Write>(out: &mut W, index: u32, payload: &[u8]) -> Result<()> {
    out.write_all(&(payload.len() as u32).to_be_bytes())?;
    out.write_all(&index.to_be_bytes())?;
    out.write_all(payload)?;
    Ok(())
}

/// Read the header line and consume the separator, leaving the reader at the
/// first frame.
pub async fn read_header<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<FileHeader> {
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line).await?;
    if read == 0 {
        return Err(DgError::InvalidHeader("missing envelope header".into()));
    }
    while line.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
        line.pop();
    }
    let mut separator = Vec::new();
    reader.read_until(b'\n', &mut separator).await?;
    if !matches!(separator.as_slice(), b"" | b"\n" | b"\r\n") {
        return Err(DgError::InvalidHeader("malformed header separator".into()));
    }
    let text = std::str::from_utf8(&line)
        .map_err(|_| DgError::InvalidHeader("header is not UTF-8".into()))?;
    FileHeader::from_json(text)
}

/// Read the next frame; `Ok(None)` at a clean end of stream. A torn frame
/// header or short payload is fatal.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<(u32, Vec<u8>)>> {
    let mut frame_header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        let read = reader.read(&mut frame_header[filled..]).await?;
        if read == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(DgError::InvalidHeader("truncated frame header".into()));
        }
        filled += read;
    }
    let length = u32::from_be_bytes([
        frame_header[0],
        frame_header[1],
        frame_header[2],
        frame_header[3],
    ]) as usize;
    let index = u32::from_be_bytes([
        frame_header[4],
        frame_header[5],
        frame_header[6],
        frame_header[7],
    ]);
    if length > max_len {
        return Err(DgError::InvalidHeader(format!(
            "frame exceeds maximum length ({length} > {max_len})"
        )));
    }
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            DgError::InvalidHeader("truncated ciphertext frame".into())
        } else {
            DgError::Io(e)
        }
    })?;
    Ok(Some((index, payload)))
}
