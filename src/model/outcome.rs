//! Run statistics reported at the end of every run.

use serde::Serialize;

use super::message::MessageNumber;
use crate::error::FetchError;

/// A `DELE` that failed. The run keeps going after recording it.
#[derive(Debug)]
pub struct DeletionFailure {
    pub number: MessageNumber,
    pub error: FetchError,
}

/// Counts collected during one run. Purely observational, never persisted.
#[derive(Debug, Default, Serialize)]
pub struct RunOutcome {
    /// Messages fetched from the server.
    pub retrieved: usize,
    /// Total octets fetched.
    pub retrieved_bytes: u64,
    /// Fetched messages whose Message-ID was already in the archive.
    pub duplicates: usize,
    /// Messages appended to the archive in this run.
    pub archived: usize,
    /// Messages successfully marked for deletion on the server.
    pub deleted: usize,
    /// Whether deletion was suppressed for this run.
    pub kept_on_server: bool,
    /// Failed deletions, in the order they were attempted.
    #[serde(serialize_with = "serialize_failures")]
    pub deletion_failures: Vec<DeletionFailure>,
}

impl RunOutcome {
    /// The first deletion failure, which is the run's reported error.
    pub fn deletion_error(&self) -> Option<&FetchError> {
        self.deletion_failures.first().map(|f| &f.error)
    }

    /// True when the mailbox was empty and nothing happened.
    pub fn is_empty(&self) -> bool {
        self.retrieved == 0
    }
}

/// Serialized form of a [`DeletionFailure`]: the error as its message.
#[derive(Serialize)]
struct FailureView {
    number: MessageNumber,
    error: String,
}

fn serialize_failures<S>(failures: &[DeletionFailure], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(failures.iter().map(|f| FailureView {
        number: f.number,
        error: f.error.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deletion_error_is_first_failure() {
        let mut outcome = RunOutcome::default();
        assert!(outcome.deletion_error().is_none());
        for n in [2, 5] {
            let number = MessageNumber::new(n).unwrap();
            outcome.deletion_failures.push(DeletionFailure {
                number,
                error: FetchError::Protocol {
                    command: format!("DELE {n}"),
                    number: Some(number),
                    reason: "-ERR no such message".into(),
                },
            });
        }
        let err = outcome.deletion_error().unwrap();
        assert_eq!(err.message_number().map(MessageNumber::get), Some(2));
    }

    #[test]
    fn test_json_shape() {
        let outcome = RunOutcome {
            retrieved: 3,
            duplicates: 2,
            archived: 1,
            deleted: 3,
            ..Default::default()
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["retrieved"], 3);
        assert_eq!(value["duplicates"], 2);
        assert_eq!(value["deletion_failures"], serde_json::json!([]));
    }

    #[test]
    fn test_json_failures_carry_number_and_message() {
        let number = MessageNumber::new(4).unwrap();
        let outcome = RunOutcome {
            deletion_failures: vec![DeletionFailure {
                number,
                error: FetchError::Protocol {
                    command: "DELE 4".into(),
                    number: Some(number),
                    reason: "-ERR locked".into(),
                },
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(&outcome).unwrap();
        let failure = &value["deletion_failures"][0];
        assert_eq!(failure["number"], 4);
        assert!(failure["error"].as_str().unwrap().contains("-ERR locked"));
    }
}
