//! Messages as they travel from the server to the archive.

use std::fmt;

use serde::Serialize;

/// Position of a message inside one POP3 session (1-based).
///
/// Only meaningful while the session that produced it is open: the server
/// renumbers the mailbox on every login. Never persist it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MessageNumber(u32);

impl MessageNumber {
    /// Wrap a raw message number. Returns `None` for 0.
    pub fn new(n: u32) -> Option<Self> {
        (n > 0).then_some(Self(n))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MessageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a `LIST` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Listing {
    pub number: MessageNumber,
    /// Size in octets as reported by the server.
    pub size: u64,
}

/// A fully retrieved message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Session-scoped number used to issue the matching `DELE`.
    pub number: MessageNumber,
    /// Raw RFC 5322 bytes, headers included, LF line endings.
    pub content: Vec<u8>,
}

impl Message {
    pub fn new(number: MessageNumber, content: impl Into<Vec<u8>>) -> Self {
        Self {
            number,
            content: content.into(),
        }
    }

    /// The Message-ID of this message, if it has a non-empty one.
    pub fn message_id(&self) -> Option<String> {
        crate::parser::header::extract_message_id(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_number_rejects_zero() {
        assert!(MessageNumber::new(0).is_none());
        assert_eq!(MessageNumber::new(7).map(MessageNumber::get), Some(7));
    }

    #[test]
    fn test_message_id_from_content() {
        let n = MessageNumber::new(1).unwrap();
        let msg = Message::new(n, "Message-ID: <a@b>\n\nbody\n");
        assert_eq!(msg.message_id().as_deref(), Some("<a@b>"));
        let msg = Message::new(n, "Subject: none\n\nbody\n");
        assert_eq!(msg.message_id(), None);
    }
}
