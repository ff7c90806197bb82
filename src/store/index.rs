//! Identity index: the Message-IDs already present in an archive.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::parser::header;
use crate::parser::mbox::MboxParser;

/// Message-IDs found in the archive at the start of a run.
///
/// Built once, read-only afterwards. Messages appended during the run are
/// never added to it.
#[derive(Debug, Clone, Default)]
pub struct IdentitySet {
    ids: HashSet<String>,
}

impl IdentitySet {
    pub fn contains(&self, message_id: &str) -> bool {
        self.ids.contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<String> for IdentitySet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Scan the archive once and collect every Message-ID in it.
///
/// A missing archive yields an empty set. A file that is not framed as an
/// MBOX is an error.
pub fn scan(path: &Path) -> Result<IdentitySet> {
    let Some(parser) = MboxParser::open(path)? else {
        debug!(path = %path.display(), "No existing archive");
        return Ok(IdentitySet::default());
    };

    let mut ids = HashSet::new();
    let entries = parser.parse(&mut |entry| {
        if let Some(id) = header::extract_message_id(entry.stored()) {
            ids.insert(id);
        }
    })?;

    info!(
        path = %path.display(),
        entries,
        message_ids = ids.len(),
        "Scanned existing archive"
    );
    Ok(IdentitySet { ids })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    #[test]
    fn test_scan_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = scan(&dir.path().join("nope.mbox")).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_scan_empty_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mbox");
        std::fs::write(&path, b"").unwrap();
        assert!(scan(&path).unwrap().is_empty());
    }

    #[test]
    fn test_scan_collects_ids_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mbox");
        std::fs::write(
            &path,
            "From MAILER-DAEMON Thu Jan  4 10:00:00 2024\n\
             Message-ID: <one@x>\n\nbody\n\n\
             From MAILER-DAEMON Thu Jan  4 10:00:00 2024\n\
             Message-ID: <one@x>\n\nagain\n\n\
             From MAILER-DAEMON Thu Jan  4 10:00:00 2024\n\
             Subject: no id\n\nMessage-ID: <in-body@x>\n\n",
        )
        .unwrap();
        let set = scan(&path).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains("<one@x>"));
        assert!(!set.contains("<in-body@x>"));
    }

    #[test]
    fn test_scan_rejects_non_mbox() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mbox");
        std::fs::write(&path, "Subject: not an mbox\n\nbody\n").unwrap();
        let err = scan(&path).unwrap_err();
        assert!(matches!(err, FetchError::InvalidArchive { .. }));
    }
}
