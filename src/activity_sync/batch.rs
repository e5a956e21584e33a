use crate::common::error::SyncError;
use crate::common::strava_client::ACTIVITY_URL;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unchanged,
    AlreadyCreated,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unchanged => f.write_str("no change"),
            SkipReason::AlreadyCreated => f.write_str("already uploaded"),
        }
    }
}

/// What the runner should do with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Upload,
    Skip(SkipReason),
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Upload => "upload",
            Action::Skip(_) => "skip",
        }
    }

    fn progressive(self) -> &'static str {
        match self {
            Action::Create => "Creating",
            Action::Update => "Updating",
            Action::Upload => "Uploading",
            Action::Skip(_) => "Skipping",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// 1-based data row to start at; the header row is not counted.
    pub start_row: usize,
    pub dry_run: bool,
    /// Stop after this many non-skipped rows.
    pub max: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            start_row: 1,
            dry_run: false,
            max: None,
        }
    }
}

/// The row currently being processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCursor {
    row: usize,
}

impl BatchCursor {
    pub fn row(&self) -> usize {
        self.row
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub created: usize,
    pub updated: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub dry_run: bool,
    pub stopped_at_max: bool,
}

impl BatchSummary {
    /// Rows that were (or in a dry run, would have been) sent to the service.
    pub fn performed(&self) -> usize {
        self.created + self.updated + self.uploaded
    }

    fn record(&mut self, action: Action) {
        match action {
            Action::Create => self.created += 1,
            Action::Update => self.updated += 1,
            Action::Upload => self.uploaded += 1,
            Action::Skip(_) => self.skipped += 1,
        }
    }
}

/// Per-command behavior plugged into [`BatchRunner`].
#[allow(async_fn_in_trait)]
pub trait RowHandler {
    type Row: fmt::Display;

    /// Validates and classifies a row without contacting the service.
    fn plan(&self, row: &Self::Row) -> Result<Action, SyncError>;

    /// Performs `action` remotely and returns the resulting activity ID.
    async fn apply(&mut self, row: &mut Self::Row, action: Action) -> Result<u64, SyncError>;
}

/// A row failure that halted the batch.
#[derive(Debug)]
pub struct BatchError {
    pub row: usize,
    pub record: String,
    pub action: Option<Action>,
    pub cause: SyncError,
}

impl BatchError {
    /// Flags for resuming the batch. Nothing to resume when the first row failed.
    pub fn resume_hint(&self) -> Option<String> {
        (self.row > 1).then(|| {
            format!(
                "rows before {row} were processed; rerun with --start_row {row} to retry this row, or --start_row {next} to skip it",
                row = self.row,
                next = self.row + 1
            )
        })
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = self.action.map_or("process", Action::verb);
        write!(
            f,
            "failed to {verb} activity {} on row {}: {}",
            self.record, self.row, self.cause
        )?;
        if let Some(hint) = self.resume_hint() {
            write!(f, "\n{hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

pub struct BatchRunner {
    options: BatchOptions,
    cursor: BatchCursor,
}

impl BatchRunner {
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options,
            cursor: BatchCursor::default(),
        }
    }

    pub fn cursor(&self) -> BatchCursor {
        self.cursor
    }

    /// Processes `rows` in file order from `start_row`, stopping at the first error.
    pub async fn run<H: RowHandler>(
        &mut self,
        handler: &mut H,
        rows: &mut [H::Row],
    ) -> Result<BatchSummary, BatchError> {
        let mut summary = BatchSummary {
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        let start = self.options.start_row.max(1);
        if start > 1 {
            info!("Starting at row {start}, skipping {} rows", (start - 1).min(rows.len()));
        }
        if start > rows.len() {
            warn!("--start_row {start} is past the last row ({}), nothing to do", rows.len());
        }

        for (index, row) in rows.iter_mut().enumerate() {
            let line = index + 1;
            if line < start {
                continue;
            }
            if self.options.max.is_some_and(|max| summary.performed() >= max) {
                info!("Reached the maximum of {} activities, stopping before row {line}", summary.performed());
                summary.stopped_at_max = true;
                break;
            }
            self.cursor.row = line;

            let action = match handler.plan(row) {
                Ok(action) => action,
                Err(cause) => return Err(self.fail(row.to_string(), None, cause)),
            };

            match action {
                Action::Skip(SkipReason::Unchanged) => {
                    debug!("row {line}: {row} unchanged, skipping");
                }
                Action::Skip(reason) => {
                    println!("  {row} on row {line}: {reason}, skipping");
                }
                _ if self.options.dry_run => {
                    println!("  Would {} {row}...", action.verb());
                }
                _ => {
                    println!("  {} {row}...", action.progressive());
                    let result = handler.apply(row, action).await;
                    match result {
                        Ok(activity_id) => println!("  --> {ACTIVITY_URL}/{activity_id}"),
                        Err(cause) => return Err(self.fail(row.to_string(), Some(action), cause)),
                    }
                }
            }
            summary.record(action);
        }

        Ok(summary)
    }

    fn fail(&self, record: String, action: Option<Action>, cause: SyncError) -> BatchError {
        BatchError {
            row: self.cursor.row,
            record,
            action,
            cause,
        }
    }
}
