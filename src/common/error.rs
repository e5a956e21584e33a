use crate::activity_sync::validate::ValidationError;
use crate::common::strava_client::ApiError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading inputs, reconciling records or processing a row.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("failed to write .csv: {0}")]
    Write(#[from] csv::Error),

    #[error(
        "original has {previous} activities, but updated has {updated}; for update, they should be the same"
    )]
    CountMismatch { previous: usize, updated: usize },

    #[error("activity ID {id} appears more than once (again on row {row})")]
    DuplicateId { id: u64, row: usize },

    #[error("row {row}: {reason}")]
    Unreconciled { row: usize, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("authorization failed: {0}")]
    Auth(String),
}
