//! The retrieval pipeline: connect, fetch, deduplicate, archive, delete.
//!
//! Stages run strictly one after another:
//!
//! ```text
//! Idle → Connected → Enumerated → Filtered → Written → {Deleted | SkippedDeletion} → Done
//! ```
//!
//! Nothing is deleted from the server until [`Archive::append`] has returned
//! `Ok`, which implies the new messages were flushed to disk. Any error before
//! that point aborts the run. Deletion errors are collected and the loop goes
//! on. The session is closed on every path by [`SessionGuard`].

use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::message::{Listing, Message, MessageNumber};
use crate::model::outcome::{DeletionFailure, RunOutcome};
use crate::store::{Archive, IdentitySet};

/// An open, authenticated mailbox.
pub trait MailSource {
    /// Every message currently in the mailbox, ascending by number.
    fn list_all(&mut self) -> Result<Vec<Listing>>;

    /// The full raw content of one message, headers included.
    fn fetch(&mut self, number: MessageNumber) -> Result<Vec<u8>>;

    /// Mark one message for removal. The server applies it when the session
    /// closes cleanly.
    fn delete(&mut self, number: MessageNumber) -> Result<()>;

    /// Terminate the session. Failures are logged, never returned.
    fn close(&mut self);
}

/// Something that can open a [`MailSource`].
pub trait Connect {
    type Session: MailSource;

    /// Connect and authenticate. Never returns a half-authenticated session.
    fn open(&self) -> Result<Self::Session>;
}

/// States of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Idle,
    Connected,
    Enumerated,
    Filtered,
    Written,
    Deleted,
    SkippedDeletion,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::Enumerated => "enumerated",
            Self::Filtered => "filtered",
            Self::Written => "written",
            Self::Deleted => "deleted",
            Self::SkippedDeletion => "skipped deletion",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Closes the wrapped session when dropped.
pub struct SessionGuard<S: MailSource> {
    session: S,
}

impl<S: MailSource> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }
}

impl<S: MailSource> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: MailSource> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: MailSource> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.close();
    }
}

/// Fetched messages split against the identity set.
#[derive(Debug, Default)]
pub struct Partition {
    /// Messages to append, in server order.
    pub new: Vec<Message>,
    /// Message-IDs of messages already archived, in server order.
    pub duplicates: Vec<String>,
}

/// One retrieval run against one mailbox and one archive.
pub struct Pipeline<C, A> {
    connector: C,
    archive: A,
    keep_on_server: bool,
}

impl<C: Connect, A: Archive> Pipeline<C, A> {
    pub fn new(connector: C, archive: A) -> Self {
        Self {
            connector,
            archive,
            keep_on_server: false,
        }
    }

    /// Retrieve and archive, but never delete from the server.
    pub fn keep_on_server(mut self, keep: bool) -> Self {
        self.keep_on_server = keep;
        self
    }

    /// Execute one run.
    ///
    /// `progress` receives `(fetched, total)` while messages are retrieved.
    ///
    /// Fatal errors come back as `Err(FetchError::Aborted { .. })`. Failed
    /// deletions do not make the run fail here: they are listed in
    /// [`RunOutcome::deletion_failures`] and the first one is
    /// [`RunOutcome::deletion_error`].
    pub fn run(&mut self, progress: Option<&dyn Fn(usize, usize)>) -> Result<RunOutcome> {
        let mut stage = Stage::Idle;
        let mut outcome = RunOutcome {
            kept_on_server: self.keep_on_server,
            ..Default::default()
        };

        let session = self.connector.open().map_err(|e| e.at_stage(stage))?;
        let mut session = SessionGuard::new(session);
        stage = enter(Stage::Connected);

        let messages = fetch_all(&mut *session, progress).map_err(|e| e.at_stage(stage))?;
        if messages.is_empty() {
            info!("No messages to download");
            enter(Stage::Done);
            return Ok(outcome);
        }
        outcome.retrieved = messages.len();
        outcome.retrieved_bytes = messages.iter().map(|m| m.content.len() as u64).sum();
        info!(count = messages.len(), "Retrieved messages");
        stage = enter(Stage::Enumerated);

        let known = self.archive.scan().map_err(|e| e.at_stage(stage))?;
        let numbers: Vec<MessageNumber> = messages.iter().map(|m| m.number).collect();
        let partition = partition(messages, &known);
        outcome.duplicates = partition.duplicates.len();
        if outcome.duplicates > 0 {
            info!(count = outcome.duplicates, "Found duplicate messages, skipping");
        }
        stage = enter(Stage::Filtered);

        if partition.new.is_empty() {
            info!("All messages are duplicates, nothing to write");
        } else {
            outcome.archived = self
                .archive
                .append(&partition.new)
                .map_err(|e| e.at_stage(stage))?;
            info!(count = outcome.archived, "Wrote new messages to archive");
        }
        enter(Stage::Written);

        if self.keep_on_server {
            info!("Dry run: leaving messages on the server");
            enter(Stage::SkippedDeletion);
        } else {
            for (number, result) in delete_all(&mut *session, &numbers) {
                match result {
                    Ok(()) => outcome.deleted += 1,
                    Err(error) => outcome.deletion_failures.push(DeletionFailure { number, error }),
                }
            }
            info!(
                deleted = outcome.deleted,
                failed = outcome.deletion_failures.len(),
                "Deleted messages from server"
            );
            enter(Stage::Deleted);
        }

        drop(session);
        enter(Stage::Done);
        Ok(outcome)
    }
}

fn enter(stage: Stage) -> Stage {
    debug!(%stage, "Entering stage");
    stage
}

/// List the mailbox and retrieve every message in ascending order.
///
/// Any failure aborts: a partial fetch is never handed on.
pub fn fetch_all<S: MailSource + ?Sized>(
    source: &mut S,
    progress: Option<&dyn Fn(usize, usize)>,
) -> Result<Vec<Message>> {
    let listings = source.list_all()?;
    let total = listings.len();
    let mut messages = Vec::with_capacity(total);

    for (i, listing) in listings.iter().enumerate() {
        let content = source.fetch(listing.number)?;
        debug!(
            number = listing.number.get(),
            listed = listing.size,
            bytes = content.len(),
            "Fetched message"
        );
        messages.push(Message::new(listing.number, content));
        if let Some(cb) = progress {
            cb(i + 1, total);
        }
    }

    Ok(messages)
}

/// Split messages into new ones and ones whose Message-ID is already known.
///
/// A message without a Message-ID is always new.
pub fn partition(messages: Vec<Message>, known: &IdentitySet) -> Partition {
    let mut result = Partition::default();
    for message in messages {
        match message.message_id() {
            Some(id) if known.contains(&id) => {
                info!(message_id = %id, "Skipping duplicate message");
                result.duplicates.push(id);
            }
            _ => result.new.push(message),
        }
    }
    result
}

/// Issue `DELE` for every number, continuing past failures.
///
/// Returns one result per number, in the order attempted.
pub fn delete_all<S: MailSource + ?Sized>(
    source: &mut S,
    numbers: &[MessageNumber],
) -> Vec<(MessageNumber, Result<()>)> {
    numbers
        .iter()
        .map(|&number| {
            let result = source.delete(number);
            if let Err(e) = &result {
                warn!(number = number.get(), error = %e, "Failed to delete message");
            }
            (number, result)
        })
        .collect()
}
