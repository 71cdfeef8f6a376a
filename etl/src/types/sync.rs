use serde::{Deserialize, Serialize};

use crate::error::EtlError;
use crate::types::RecordRef;

/// A row or record that was dropped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub record_ref: RecordRef,
    pub message: String,
}

impl RecordError {
    pub fn new(record_ref: RecordRef, message: impl Into<String>) -> Self {
        Self {
            record_ref,
            message: message.into(),
        }
    }

    pub fn from_error(record_ref: RecordRef, error: &EtlError) -> Self {
        Self::new(record_ref, error.message())
    }
}

/// Outcome of syncing one entity, accumulated over all chunks of a run.
///
/// In a dry run `created` and `updated` count the writes that would have been performed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub created: u64,
    pub updated: u64,
    /// Matched records whose merge produced no change and were not written.
    pub unchanged: u64,
    pub errors: Vec<RecordError>,
    pub dry_run: bool,
    /// Set when the run failed after importing some chunks.
    #[serde(default)]
    pub aborted: bool,
}

impl SyncResult {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// Adds the counters and errors of `other` to this result.
    pub fn merge(&mut self, other: SyncResult) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.errors.extend(other.errors);
        self.aborted |= other.aborted;
    }

    pub fn push_error(&mut self, error: RecordError) {
        self.errors.push(error);
    }

    /// Number of records that were accepted by the store or matched unchanged.
    pub fn processed(&self) -> u64 {
        self.created + self.updated + self.unchanged
    }

    /// Returns `true` when some records were dropped.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
