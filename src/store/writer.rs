//! Append messages to an MBOX archive and flush them to disk.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::error::{FetchError, Result};
use crate::model::message::Message;
use crate::parser::mbox::needs_from_quoting;

/// Placeholder envelope sender; POP3 does not expose the real one.
pub const DEFAULT_ENVELOPE_SENDER: &str = "MAILER-DAEMON";

/// `asctime`-style date used on envelope lines (`Thu Jan  4 10:00:00 2024`).
const ENVELOPE_DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Appends entries to an MBOX file.
pub struct MboxWriter {
    path: PathBuf,
    envelope_sender: String,
}

impl MboxWriter {
    pub fn new(path: impl Into<PathBuf>, envelope_sender: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            envelope_sender: envelope_sender.into(),
        }
    }

    /// Append `messages` in order, stamped with the current local time.
    ///
    /// Returns only after the data has been flushed with `fsync`. An empty
    /// slice leaves the file untouched.
    pub fn append(&self, messages: &[Message]) -> Result<usize> {
        self.append_at(messages, Local::now())
    }

    /// Like [`append`](Self::append) with an explicit envelope timestamp.
    pub fn append_at(&self, messages: &[Message], now: DateTime<Local>) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }

        let created = !self.path.exists();
        let mut file =
            open_for_append(&self.path).map_err(|e| FetchError::archive_write(&self.path, e))?;
        let padding =
            separator_padding(&mut file).map_err(|e| FetchError::archive_write(&self.path, e))?;
        let mut out = BufWriter::new(file);
        if !padding.is_empty() {
            warn!(
                path = %self.path.display(),
                "Archive does not end with a blank line, closing the last entry"
            );
            out.write_all(padding)
                .map_err(|e| FetchError::archive_write(&self.path, e))?;
        }

        for message in messages {
            debug!(
                number = message.number.get(),
                bytes = message.content.len(),
                "Appending message to archive"
            );
            write_entry(&mut out, &self.envelope_sender, now, &message.content)
                .map_err(|e| FetchError::archive_write(&self.path, e))?;
        }

        let file = out
            .into_inner()
            .map_err(|e| FetchError::archive_write(&self.path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| FetchError::archive_write(&self.path, e))?;
        if created {
            sync_parent_dir(&self.path).map_err(|e| FetchError::archive_write(&self.path, e))?;
        }

        info!(
            path = %self.path.display(),
            count = messages.len(),
            "Archive flushed to disk"
        );
        Ok(messages.len())
    }
}

/// Write one MBOX entry: envelope line, quoted body, separator blank line.
pub fn write_entry<W: Write>(
    out: &mut W,
    envelope_sender: &str,
    date: DateTime<Local>,
    content: &[u8],
) -> std::io::Result<()> {
    writeln!(
        out,
        "From {} {}",
        envelope_sender,
        date.format(ENVELOPE_DATE_FORMAT)
    )?;

    for line in content.split_inclusive(|&b| b == b'\n') {
        if needs_from_quoting(line) {
            out.write_all(b">")?;
        }
        out.write_all(line)?;
    }

    if !content.is_empty() && !content.ends_with(b"\n") {
        out.write_all(b"\n")?;
    }
    out.write_all(b"\n")
}

/// Bytes needed so the next envelope starts after a blank line.
///
/// Empty for a new or empty file.
fn separator_padding(file: &mut File) -> std::io::Result<&'static [u8]> {
    let len = file.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(b"");
    }
    let tail_len = len.min(2);
    file.seek(SeekFrom::End(-(tail_len as i64)))?;
    let mut tail = [0u8; 2];
    let tail = &mut tail[..tail_len as usize];
    file.read_exact(tail)?;

    let padding: &'static [u8] = if tail.ends_with(b"\n\n") || tail == b"\n" {
        b""
    } else if tail.ends_with(b"\n") {
        b"\n"
    } else {
        b"\n\n"
    };
    Ok(padding)
}

/// Open for append, creating the file owner-only (`0600`) if needed.
fn open_for_append(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Persist the directory entry of a newly created archive.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_date() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 4, 10, 0, 0).unwrap()
    }

    fn entry(content: &[u8]) -> String {
        let mut out = Vec::new();
        write_entry(&mut out, "MAILER-DAEMON", fixed_date(), content).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_envelope_line_format() {
        let text = entry(b"Subject: hi\n\nbody\n");
        assert!(text.starts_with("From MAILER-DAEMON Thu Jan  4 10:00:00 2024\n"));
        assert!(text.ends_with("body\n\n"));
    }

    #[test]
    fn test_missing_final_newline_is_added() {
        let text = entry(b"Subject: hi\n\nno newline");
        assert!(text.ends_with("no newline\n\n"));
    }

    #[test]
    fn test_from_lines_in_body_are_quoted() {
        let text = entry(b"Subject: hi\n\nFrom the top\n>From before\nFromage\n");
        assert!(text.contains("\n>From the top\n"));
        assert!(text.contains("\n>>From before\n"));
        assert!(text.contains("\nFromage\n"));
    }

    #[test]
    fn test_crlf_content_kept_verbatim() {
        let text = entry(b"Subject: hi\r\n\r\nbody\r\n");
        assert!(text.contains("Subject: hi\r\n\r\nbody\r\n\n"));
    }

    #[test]
    fn test_append_empty_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mbox");
        let writer = MboxWriter::new(&path, DEFAULT_ENVELOPE_SENDER);
        assert_eq!(writer.append(&[]).unwrap(), 0);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_new_archive_is_owner_only() {
        use crate::model::message::MessageNumber;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mbox");
        let writer = MboxWriter::new(&path, DEFAULT_ENVELOPE_SENDER);
        let msg = Message::new(MessageNumber::new(1).unwrap(), "Subject: x\n\nbody\n");
        assert_eq!(writer.append(&[msg]).unwrap(), 1);
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_append_into_missing_directory_fails() {
        use crate::model::message::MessageNumber;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.mbox");
        let writer = MboxWriter::new(&path, DEFAULT_ENVELOPE_SENDER);
        let msg = Message::new(MessageNumber::new(1).unwrap(), "Subject: x\n\nbody\n");
        let err = writer.append(&[msg]).unwrap_err();
        assert!(matches!(err, FetchError::ArchiveWrite { .. }));
    }
}
