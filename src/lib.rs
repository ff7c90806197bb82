//! `mboxfetch`: download a POP3S mailbox into a local MBOX archive.
//!
//! Messages are deleted from the server only after they are durably stored
//! in the archive, and messages whose Message-ID the archive already holds
//! are not written twice.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod pop3;
pub mod store;
