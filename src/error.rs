//! Centralized error types for mboxfetch.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::message::MessageNumber;
use crate::pipeline::Stage;

/// All errors produced by the mboxfetch library.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The server could not be reached, or the TLS handshake / greeting failed.
    #[error("Could not connect to {addr}: {reason}")]
    Connection { addr: String, reason: String },

    /// The server rejected the credentials.
    #[error("Authentication failed for '{user}': {reason}")]
    Auth { user: String, reason: String },

    /// A POP3 command failed or its reply could not be understood.
    ///
    /// `command` is the command as sent (password excluded), e.g. `RETR 3`.
    #[error("{command} failed: {reason}")]
    Protocol {
        command: String,
        number: Option<MessageNumber>,
        reason: String,
    },

    /// I/O error while reading the existing archive.
    #[error("Could not read archive '{path}': {source}")]
    ArchiveRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The archive exists but is not framed as an MBOX.
    #[error("Archive '{path}' is not a valid MBOX: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    /// I/O error while appending to or flushing the archive.
    #[error("Could not write archive '{path}': {source}")]
    ArchiveWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A fatal error ended the run; `stage` is the last state reached.
    #[error("Run aborted after reaching '{stage}': {source}")]
    Aborted {
        stage: Stage,
        #[source]
        source: Box<FetchError>,
    },
}

/// Convenience alias for `Result<T, FetchError>`.
pub type Result<T> = std::result::Result<T, FetchError>;

impl FetchError {
    /// Create an `ArchiveRead` variant from a path and an `io::Error`.
    pub fn archive_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ArchiveRead {
            path: path.into(),
            source,
        }
    }

    /// Create an `ArchiveWrite` variant from a path and an `io::Error`.
    pub fn archive_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ArchiveWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a `Protocol` variant for a command that does not target a message.
    pub fn protocol(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Protocol {
            command: command.into(),
            number: None,
            reason: reason.into(),
        }
    }

    /// Wrap an error with the stage the run had reached.
    ///
    /// An already-wrapped error is returned unchanged.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            Self::Aborted { .. } => self,
            other => Self::Aborted {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error, looking through any `Aborted` wrapper.
    pub fn root(&self) -> &FetchError {
        match self {
            Self::Aborted { source, .. } => source.root(),
            other => other,
        }
    }

    /// The message this error concerns, if any.
    pub fn message_number(&self) -> Option<MessageNumber> {
        match self.root() {
            Self::Protocol { number, .. } => *number,
            _ => None,
        }
    }
}
