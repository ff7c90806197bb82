//! POP3 reply parsing (RFC 1939).

use crate::model::message::{Listing, MessageNumber};

/// Outcome of a status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// `+OK` with the remaining text.
    Ok(String),
    /// `-ERR` with the remaining text.
    Err(String),
}

/// Parse a status line (terminator already stripped).
///
/// Returns `None` if the line starts with neither `+OK` nor `-ERR`.
pub fn parse_status(line: &str) -> Option<Status> {
    if let Some(rest) = line.strip_prefix("+OK") {
        Some(Status::Ok(rest.trim().to_string()))
    } else {
        line.strip_prefix("-ERR")
            .map(|rest| Status::Err(rest.trim().to_string()))
    }
}

/// Parse one line of a multi-line `LIST` reply: `<number> <octets>`.
pub fn parse_listing(line: &str) -> Option<Listing> {
    let mut parts = line.split_whitespace();
    let number = parts.next()?.parse::<u32>().ok().and_then(MessageNumber::new)?;
    let size = parts.next()?.parse::<u64>().ok()?;
    Some(Listing { number, size })
}

/// Whether a raw line (terminator included) ends a multi-line reply.
pub fn is_terminator(line: &[u8]) -> bool {
    line == b".\r\n" || line == b".\n"
}

/// Undo byte-stuffing and normalise the line ending to LF.
///
/// `line` must include its terminator.
pub fn unstuff_line(line: &[u8]) -> &[u8] {
    let line = line.strip_prefix(b".").unwrap_or(line);
    line.strip_suffix(b"\r\n")
        .or_else(|| line.strip_suffix(b"\n"))
        .unwrap_or(line)
}

/// Remove the trailing CRLF / LF from a status line.
pub fn trim_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(
            parse_status("+OK POP3 server ready"),
            Some(Status::Ok("POP3 server ready".into()))
        );
        assert_eq!(parse_status("+OK"), Some(Status::Ok(String::new())));
        assert_eq!(
            parse_status("-ERR invalid password"),
            Some(Status::Err("invalid password".into()))
        );
        assert_eq!(parse_status("* OK imap"), None);
    }

    #[test]
    fn test_parse_listing() {
        let l = parse_listing("3 1200").unwrap();
        assert_eq!(l.number.get(), 3);
        assert_eq!(l.size, 1200);
        assert!(parse_listing("0 10").is_none());
        assert!(parse_listing("x 10").is_none());
        assert!(parse_listing("4").is_none());
    }

    #[test]
    fn test_unstuff_line() {
        assert_eq!(unstuff_line(b"..hidden\r\n"), b".hidden");
        assert_eq!(unstuff_line(b"plain\r\n"), b"plain");
        assert_eq!(unstuff_line(b"lf only\n"), b"lf only");
        assert!(is_terminator(b".\r\n"));
        assert!(!is_terminator(b"..\r\n"));
    }
}
