//! The local MBOX archive: identity index and durable writer.

pub mod index;
pub mod writer;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::message::Message;

pub use index::IdentitySet;

/// The archive as seen by the pipeline.
pub trait Archive {
    /// Collect the Message-IDs already stored.
    fn scan(&self) -> Result<IdentitySet>;

    /// Append `messages` and flush them durably before returning.
    ///
    /// `Ok` means every message is on disk; the pipeline deletes from the
    /// server only after this returns.
    fn append(&mut self, messages: &[Message]) -> Result<usize>;
}

/// An MBOX file on the local filesystem.
pub struct MboxArchive {
    path: PathBuf,
    writer: writer::MboxWriter,
}

impl MboxArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_envelope_sender(path, writer::DEFAULT_ENVELOPE_SENDER)
    }

    pub fn with_envelope_sender(path: impl Into<PathBuf>, sender: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            writer: writer::MboxWriter::new(path.clone(), sender),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Archive for MboxArchive {
    fn scan(&self) -> Result<IdentitySet> {
        index::scan(&self.path)
    }

    fn append(&mut self, messages: &[Message]) -> Result<usize> {
        self.writer.append(messages)
    }
}
