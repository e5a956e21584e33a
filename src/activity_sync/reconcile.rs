use crate::common::error::SyncError;
use crate::records::{ActivityRecord, RecordSet};
use tracing::debug;

/// How one row of an updated file relates to the original download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unchanged,
    Create,
    Update,
    Error(String),
}

/// Classifies a single updated row against the original set.
pub fn classify(previous: &RecordSet, record: &ActivityRecord) -> Outcome {
    let Some(id) = record.remote_id() else {
        return Outcome::Create;
    };
    match previous.get(id) {
        None => Outcome::Error(format!("activity ID {id} not found in original set")),
        Some(prev) if prev == record => {
            debug!("no change for ID {id}");
            Outcome::Unchanged
        }
        Some(_) => Outcome::Update,
    }
}

/// Classifies every row of `updated`, in order. The two sets must be paired
/// snapshots of the same rows, so differing lengths fail before anything is
/// classified.
pub fn reconcile(previous: &RecordSet, updated: &RecordSet) -> Result<Vec<Outcome>, SyncError> {
    if previous.len() != updated.len() {
        return Err(SyncError::CountMismatch {
            previous: previous.len(),
            updated: updated.len(),
        });
    }
    Ok(updated
        .records()
        .iter()
        .map(|record| classify(previous, record))
        .collect())
}

/// Returns the first unresolvable row (1-based) as an error.
pub fn ensure_resolved(outcomes: &[Outcome]) -> Result<(), SyncError> {
    match outcomes.iter().enumerate().find_map(|(index, outcome)| match outcome {
        Outcome::Error(reason) => Some((index + 1, reason)),
        _ => None,
    }) {
        Some((row, reason)) => Err(SyncError::Unreconciled {
            row,
            reason: reason.clone(),
        }),
        None => Ok(()),
    }
}
