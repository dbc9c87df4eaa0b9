//! Framed I/O for the IMAP wire protocol.
//!
//! The unit of reading is one response: a CRLF-terminated line plus
//! every literal payload announced on it. The parser never sees a
//! partial unit, and the reconciler never sees half a notification.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Default cap on a single response line.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Default cap on a single literal payload.
pub const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Framed connection over any async byte stream.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    max_line_length: usize,
    max_literal_size: usize,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a framed stream with default size limits.
    pub fn new(stream: S) -> Self {
        Self::with_limits(stream, MAX_LINE_LENGTH, MAX_LITERAL_SIZE)
    }

    /// Creates a framed stream with explicit size limits.
    pub fn with_limits(stream: S, max_line_length: usize, max_literal_size: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            max_line_length,
            max_literal_size,
        }
    }

    /// Reads one complete response unit.
    ///
    /// Lines announcing a literal (`{n}` or `{n+}` at the end) are
    /// extended with exactly `n` payload bytes and the line that
    /// follows, repeating until a line without a literal ends the
    /// unit.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(literal_len) = parse_literal_length(&line) else {
                break;
            };

            if literal_len > self.max_literal_size {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {})",
                    self.max_literal_size
                )));
            }

            let mut literal = vec![0u8; literal_len];
            self.reader.read_exact(&mut literal).await?;
            response.extend_from_slice(&literal);
            // The rest of the announcing line still follows.
        }

        Ok(response)
    }

    /// Reads a single CRLF-terminated line, including the CRLF.
    ///
    /// The terminator is found by scanning for LF so a CRLF split
    /// across two buffer fills still ends the line.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Closed);
            }

            if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&buf[..=pos]);
                self.reader.consume(pos + 1);

                if line.ends_with(b"\r\n") {
                    return Ok(line);
                }
                return Err(Error::Protocol("line ended with bare LF".to_string()));
            }

            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);

            if line.len() > self.max_line_length {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }
    }

    /// Writes a command line and flushes.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Writes a command line and its literal payload as one flush.
    ///
    /// Used with non-synchronizing literals, where the payload follows
    /// the announcement without waiting for a continuation.
    pub async fn write_command_with_payload(&mut self, line: &[u8], payload: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(line);
        self.write_buffer.extend_from_slice(payload);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buffer).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Writes raw data (continuation payloads) and flushes.
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Shuts the write side down, ignoring errors from an already-dead
    /// peer.
    pub async fn shutdown(&mut self) {
        let _ = self.reader.get_mut().shutdown().await;
    }

    /// True when no read bytes are buffered.
    ///
    /// Checked before a TLS upgrade: data pipelined past the STARTTLS
    /// completion would otherwise be interpreted as handshake bytes.
    pub fn read_buffer_is_empty(&self) -> bool {
        self.reader.buffer().is_empty()
    }

    /// A reference to the inner stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Any buffered read data is dropped; callers that care check
    /// [`read_buffer_is_empty`](Self::read_buffer_is_empty) first.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Parses a literal announcement from the end of a line.
///
/// Matches `{123}\r\n` and `{123+}\r\n`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    if !line.ends_with(b"\r\n") {
        return None;
    }

    let line = &line[..line.len() - 2];

    let open = line.iter().rposition(|&b| b == b'{')?;

    if !line.ends_with(b"}") {
        return None;
    }

    let num_start = open + 1;
    let num_end = if line.ends_with(b"+}") {
        line.len() - 2
    } else {
        line.len() - 1
    };

    if num_start >= num_end {
        return None;
    }

    let num_str = std::str::from_utf8(&line[num_start..num_end]).ok()?;
    num_str.parse().ok()
}
