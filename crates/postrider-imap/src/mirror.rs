//! Local mirror of fetched message text.
//!
//! Fetched headers and bodies are kept in an append-only byte sink so
//! the agent can re-read them without another round trip. Before
//! anything is appended the raw wire bytes are normalized: CRLF becomes
//! LF, and any line that could be mistaken for an mbox `From `
//! separator is quoted with a leading `>`. The session records where
//! each message landed as a [`MirrorSpan`].

use std::io;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::types::MirrorSpan;

/// Append-only destination for normalized message text.
#[allow(async_fn_in_trait)]
pub trait MirrorSink {
    /// Appends bytes and returns the offset of the first byte written.
    async fn append(&mut self, bytes: &[u8]) -> io::Result<u64>;
}

/// Normalizes wire bytes for the mirror: CRLF to LF, and a `>` in
/// front of any line starting with `From ` so the text can later be
/// written into an mbox file without forging a message boundary.
#[must_use]
pub fn normalize(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut at_line_start = true;
    let mut i = 0;
    while i < raw.len() {
        if at_line_start && raw[i..].starts_with(b"From ") {
            out.push(b'>');
        }
        match raw[i] {
            b'\r' if raw.get(i + 1) == Some(&b'\n') => {
                out.push(b'\n');
                i += 2;
                at_line_start = true;
            }
            b'\n' => {
                out.push(b'\n');
                i += 1;
                at_line_start = true;
            }
            byte => {
                out.push(byte);
                i += 1;
                at_line_start = false;
            }
        }
    }
    out
}

/// The inverse conversion for text leaving the mirror: every LF not
/// already preceded by CR gains one, as the wire requires. `>From `
/// quoting is left alone; it is part of the stored text.
#[must_use]
pub fn to_crlf(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + text.len() / 16);
    let mut previous = 0u8;
    for &byte in text {
        if byte == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);
        previous = byte;
    }
    out
}

/// Number of lines in normalized text. A trailing fragment without a
/// final LF counts as a line.
#[must_use]
pub fn count_lines(bytes: &[u8]) -> u32 {
    let full = bytes.iter().filter(|&&b| b == b'\n').count();
    let partial = usize::from(!bytes.is_empty() && bytes.last() != Some(&b'\n'));
    u32::try_from(full + partial).unwrap_or(u32::MAX)
}

/// Splits a normalized message at the first blank line. The header
/// half keeps the blank separator; a message with no blank line is all
/// header.
#[must_use]
pub fn split_header_body(bytes: &[u8]) -> (&[u8], &[u8]) {
    let mut i = 0;
    while i < bytes.len() {
        let line_end = bytes[i..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |p| i + p);
        if line_end == i {
            // Blank line: the separator belongs to the header half.
            return bytes.split_at(line_end + 1);
        }
        i = line_end + 1;
    }
    (bytes, &[])
}

/// Appends already-normalized bytes and reports where they landed.
pub async fn append_span(sink: &mut impl MirrorSink, bytes: &[u8]) -> io::Result<MirrorSpan> {
    let offset = sink.append(bytes).await?;
    Ok(MirrorSpan {
        offset,
        size: u32::try_from(bytes.len()).unwrap_or(u32::MAX),
        lines: count_lines(bytes),
    })
}

/// Mirror held in memory. Backs tests and cache-only sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryMirror {
    /// Everything appended so far, in order.
    pub bytes: Vec<u8>,
}

impl MemoryMirror {
    /// Creates an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The bytes a span refers to.
    #[must_use]
    pub fn read_span(&self, span: MirrorSpan) -> Option<&[u8]> {
        let start = usize::try_from(span.offset).ok()?;
        let end = start.checked_add(span.size as usize)?;
        self.bytes.get(start..end)
    }
}

impl MirrorSink for MemoryMirror {
    async fn append(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let offset = self.bytes.len() as u64;
        self.bytes.extend_from_slice(bytes);
        Ok(offset)
    }
}

/// Mirror backed by an append-only file on disk.
#[derive(Debug)]
pub struct FileMirror {
    file: tokio::fs::File,
    length: u64,
}

impl FileMirror {
    /// Opens (creating if needed) the mirror file and positions new
    /// appends after any existing content.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be opened
    /// or its length read.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let length = file.metadata().await?.len();
        Ok(Self { file, length })
    }
}

impl MirrorSink for FileMirror {
    async fn append(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let offset = self.length;
        self.file.write_all(bytes).await?;
        self.file.flush().await?;
        self.length += bytes.len() as u64;
        Ok(offset)
    }
}
