//! Streaming MBOX reader.
//!
//! Reads the archive line-by-line through a 1 MB buffer and hands each entry
//! to a callback. Never loads the whole file into memory.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{FetchError, Result};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// One archive entry as stored on disk.
#[derive(Debug, Clone, Copy)]
pub struct MboxEntry<'a> {
    /// Raw bytes from the envelope line up to the next entry (or EOF).
    pub raw: &'a [u8],
}

impl<'a> MboxEntry<'a> {
    /// The entry without its envelope line, still in on-disk form.
    pub fn stored(&self) -> &'a [u8] {
        &self.raw[first_line(self.raw).len()..]
    }

    /// The stored message: envelope stripped, trailing separator blank line
    /// dropped, and `>From ` quoting reverted.
    pub fn content(&self) -> Vec<u8> {
        let body = self.stored();
        let body = if body.ends_with(b"\r\n\r\n") {
            &body[..body.len() - 2]
        } else if body.ends_with(b"\n\n") {
            &body[..body.len() - 1]
        } else {
            body
        };
        unescape_from_lines(body)
    }
}

/// Streaming MBOX reader.
///
/// An entry starts at a line beginning with `From `. The reader is tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - A truncated last entry
/// - A UTF-8 BOM at the start of the file
///
/// A non-empty file whose first line is not a `From ` envelope is rejected.
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
}

impl MboxParser {
    /// Create a parser for the given MBOX file.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        match std::fs::metadata(&path) {
            Ok(metadata) => Ok(Some(Self {
                path,
                file_size: metadata.len(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FetchError::archive_read(&path, e)),
        }
    }

    /// Read the whole file, calling `entry_callback` for each entry found.
    ///
    /// Returns the number of entries found.
    pub fn parse(&self, entry_callback: &mut dyn FnMut(MboxEntry<'_>)) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| FetchError::archive_read(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut entry_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut prev_line_was_empty = true;
        let mut first_line = true;

        // Reusable line buffer
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line_buf.clear();
            let line_len = reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| FetchError::archive_read(&self.path, e))?;
            if line_len == 0 {
                break; // EOF
            }

            let is_from_line = is_mbox_separator(&line_buf);

            if first_line && !is_from_line {
                return Err(FetchError::InvalidArchive {
                    path: self.path.clone(),
                    reason: "file does not start with a 'From ' envelope line".to_string(),
                });
            }

            if is_from_line {
                if !first_line && !prev_line_was_empty {
                    warn!(
                        offset = current_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                if !entry_buf.is_empty() {
                    entry_callback(MboxEntry { raw: &entry_buf });
                    count += 1;
                }
                entry_buf.clear();
            }
            entry_buf.extend_from_slice(&line_buf);

            prev_line_was_empty = is_blank_line(&line_buf);
            first_line = false;
            current_offset += line_len as u64;
        }

        if !entry_buf.is_empty() {
            entry_callback(MboxEntry { raw: &entry_buf });
            count += 1;
        }

        Ok(count)
    }
}

/// Check whether a line is an MBOX separator (`From ` at the start).
pub(crate) fn is_mbox_separator(line: &[u8]) -> bool {
    // Skip BOM if present at very start
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

/// Whether a body line needs one more `>` when written (mboxrd: `^>*From `).
pub(crate) fn needs_from_quoting(line: &[u8]) -> bool {
    let unquoted = &line[line.iter().take_while(|&&b| b == b'>').count()..];
    unquoted.starts_with(b"From ")
}

/// Revert mboxrd quoting: strip one `>` from every line matching `^>+From `.
fn unescape_from_lines(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    for line in body.split_inclusive(|&b| b == b'\n') {
        if line.first() == Some(&b'>') && needs_from_quoting(line) {
            out.extend_from_slice(&line[1..]);
        } else {
            out.extend_from_slice(line);
        }
    }
    out
}

fn first_line(raw: &[u8]) -> &[u8] {
    match raw.iter().position(|&b| b == b'\n') {
        Some(pos) => &raw[..=pos],
        None => raw,
    }
}
