use super::batch::{Action, BatchRunner, BatchSummary, RowHandler, SkipReason};
use super::create::create_record;
use super::reconcile::{Outcome, ensure_resolved, reconcile};
use super::validate::{verify_for_create, verify_for_update};
use super::{ActivitySync, report};
use crate::common::csv_codec::{load_csv, write_csv};
use crate::common::error::SyncError;
use crate::common::strava_client::{ActivityApi, ActivityUpdate};
use crate::records::{ActivityRecord, Field, RecordSet};
use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Builds the update body for `record`. Description is only sent when it
/// differs from `prev`, since downloaded rows never carry one.
fn activity_update(record: &ActivityRecord, prev: &ActivityRecord) -> ActivityUpdate {
    let description_changed = record.changed_fields(prev).contains(&Field::Description);
    ActivityUpdate {
        name: record.name.clone(),
        activity_type: record.activity_type.clone(),
        description: description_changed.then(|| record.description.clone()),
        commute: record.commute,
        trainer: record.trainer,
        gear_id: Some(record.gear_id.clone()).filter(|g| !g.is_empty()),
        workout_type: record.workout_type,
    }
}

/// An updated row together with its reconciliation outcome.
struct UpdateRow {
    line: usize,
    record: ActivityRecord,
    outcome: Outcome,
}

impl fmt::Display for UpdateRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.record, f)
    }
}

struct UpdateHandler<'a, A> {
    api: &'a A,
    previous: &'a RecordSet,
}

impl<A: ActivityApi> RowHandler for UpdateHandler<'_, A> {
    type Row = UpdateRow;

    fn plan(&self, row: &UpdateRow) -> Result<Action, SyncError> {
        match &row.outcome {
            Outcome::Unchanged => Ok(Action::Skip(SkipReason::Unchanged)),
            Outcome::Create => {
                verify_for_create(&row.record)?;
                Ok(Action::Create)
            }
            Outcome::Update => {
                let prev = row
                    .record
                    .remote_id()
                    .and_then(|id| self.previous.get(id))
                    .ok_or_else(|| SyncError::Unreconciled {
                        row: row.line,
                        reason: "activity is missing from original set".to_string(),
                    })?;
                verify_for_update(&row.record, prev)?;
                Ok(Action::Update)
            }
            Outcome::Error(reason) => Err(SyncError::Unreconciled {
                row: row.line,
                reason: reason.clone(),
            }),
        }
    }

    async fn apply(&mut self, row: &mut UpdateRow, action: Action) -> Result<u64, SyncError> {
        match (action, row.record.remote_id()) {
            (Action::Update, Some(id)) => {
                let prev = self.previous.get(id).ok_or_else(|| SyncError::Unreconciled {
                    row: row.line,
                    reason: format!("activity ID {id} not found in original set"),
                })?;
                let update = activity_update(&row.record, prev);
                let updated = self.api.update_activity(id, &update).await?;
                info!("Updated activity {id} ({})", updated.name);
                Ok(id)
            }
            _ => create_record(self.api, &mut row.record).await,
        }
    }
}

impl<A: ActivityApi> ActivitySync<A> {
    /// Pushes the differences between `updated` and the `original` download.
    ///
    /// Nothing is sent unless both files have the same number of rows and
    /// every ID in `updated` exists in `original`. When `output` is given, the
    /// updated rows (with IDs for newly created ones) are written there.
    pub async fn update_activities(
        &self,
        original: &Path,
        updated: &Path,
        output: Option<&Path>,
    ) -> Result<BatchSummary> {
        let previous = RecordSet::new(load_csv(original)?)
            .with_context(|| format!("invalid original file {original:?}"))?;
        let next = RecordSet::new(load_csv(updated)?)
            .with_context(|| format!("invalid updated file {updated:?}"))?;

        let outcomes = reconcile(&previous, &next)
            .with_context(|| format!("cannot compare {original:?} with {updated:?}"))?;
        ensure_resolved(&outcomes).with_context(|| format!("cannot update from {updated:?}"))?;
        println!(
            "Found {} activities in {:?} to compare against {:?}.",
            next.len(),
            updated,
            original
        );

        let mut rows: Vec<UpdateRow> = next
            .into_records()
            .into_iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (record, outcome))| UpdateRow {
                line: index + 1,
                record,
                outcome,
            })
            .collect();

        let mut handler = UpdateHandler {
            api: &self.api,
            previous: &previous,
        };
        let result = BatchRunner::new(self.options)
            .run(&mut handler, &mut rows)
            .await;

        let written = match output {
            Some(path) => {
                let records: Vec<ActivityRecord> = rows.into_iter().map(|row| row.record).collect();
                write_csv(Some(path), &records).context("failed to write results")
            }
            None => Ok(()),
        };
        let summary = result?;
        written?;

        report(&summary, summary.updated, "Updated", "updated");
        if summary.created > 0 {
            report(&summary, summary.created, "Created", "created");
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_sync::BatchError;
    use crate::activity_sync::batch::BatchOptions;
    use crate::activity_sync::validate::Catalog;
    use crate::common::mock_api::{Call, MockApi};

    const HEADER: &str = "ID,Start,Type,Name,Description,Workout Type,Gear ID,Duration (seconds),Distance,Private?,Commute?,Trainer?\n";

    const ORIGINAL: &[&str] = &[
        "100,2024-03-01T07:30:00Z,Run,Morning Run,,,,1800,5000,false,false,false",
        "101,2024-03-02T07:30:00Z,Ride,Lunch Ride,,,b1,3600,20000,false,false,false",
        "102,2024-03-03T07:30:00Z,Swim,Pool,,,,1200,1000,false,false,false",
    ];

    struct Fixture {
        dir: tempfile::TempDir,
        sync: ActivitySync<MockApi>,
    }

    impl Fixture {
        fn new(options: BatchOptions, updated: &[&str]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("orig.csv"), HEADER.to_string() + &ORIGINAL.join("\n")).unwrap();
            std::fs::write(dir.path().join("updated.csv"), HEADER.to_string() + &updated.join("\n")).unwrap();
            let sync = ActivitySync::new(MockApi::default(), Catalog::default(), options);
            Fixture { dir, sync }
        }

        async fn run(&self) -> Result<BatchSummary> {
            let dir = self.dir.path();
            self.sync
                .update_activities(
                    &dir.join("orig.csv"),
                    &dir.join("updated.csv"),
                    Some(&dir.join("out.csv")),
                )
                .await
        }
    }

    #[tokio::test]
    async fn test_identical_files_make_no_calls() {
        let fixture = Fixture::new(BatchOptions::default(), ORIGINAL);
        let summary = fixture.run().await.unwrap();

        assert_eq!(summary.performed(), 0);
        assert_eq!(summary.skipped, 3);
        assert!(fixture.sync.api().calls().is_empty());
    }

    #[tokio::test]
    async fn test_sends_only_changed_rows() {
        let updated = [
            ORIGINAL[0],
            "101,2024-03-02T07:30:00Z,Ride,Lunch Ride,windy,,b2,3600,20000,false,true,false",
            ORIGINAL[2],
        ];
        let fixture = Fixture::new(BatchOptions::default(), &updated);
        let summary = fixture.run().await.unwrap();

        assert_eq!(summary.updated, 1);
        let calls = fixture.sync.api().calls();
        assert_eq!(calls.len(), 1);
        let Call::Update(id, update) = &calls[0] else {
            panic!("expected an update, got {calls:?}");
        };
        assert_eq!(*id, 101);
        assert_eq!(update.description.as_deref(), Some("windy"));
        assert_eq!(update.gear_id.as_deref(), Some("b2"));
        assert!(update.commute);
    }

    #[tokio::test]
    async fn test_rename_leaves_description_out_of_body() {
        let updated = [
            "100,2024-03-01T07:30:00Z,Run,Renamed Run,,,,1800,5000,false,false,false",
            ORIGINAL[1],
            ORIGINAL[2],
        ];
        let fixture = Fixture::new(BatchOptions::default(), &updated);
        fixture.run().await.unwrap();

        let calls = fixture.sync.api().calls();
        let Call::Update(id, update) = &calls[0] else {
            panic!("expected an update, got {calls:?}");
        };
        assert_eq!(*id, 100);
        assert_eq!(update.description, None);
        let body = serde_json::to_value(update).unwrap();
        assert_eq!(body["name"], "Renamed Run");
        assert!(body.get("description").is_none());
    }

    #[tokio::test]
    async fn test_zero_id_row_is_created_and_echoed() {
        let updated = [
            ORIGINAL[0],
            ORIGINAL[1],
            "0,2024-03-05T07:30:00Z,Walk,New Walk,,,,600,800,false,false,false",
        ];
        let fixture = Fixture::new(BatchOptions::default(), &updated);
        let summary = fixture.run().await.unwrap();

        assert_eq!(summary.created, 1);
        let calls = fixture.sync.api().calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::Create(new) if new.name == "New Walk"));

        let written: Vec<ActivityRecord> = load_csv(&fixture.dir.path().join("out.csv")).unwrap();
        assert_eq!(written[2].remote_id(), Some(1001));
    }

    #[tokio::test]
    async fn test_count_mismatch_makes_no_calls() {
        let fixture = Fixture::new(BatchOptions::default(), &ORIGINAL[..2]);
        let err = fixture.run().await.unwrap_err();

        assert!(format!("{err:#}").contains("original has 3 activities, but updated has 2"));
        assert!(fixture.sync.api().calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_halts_before_any_call() {
        let updated = [
            "100,2024-03-01T07:30:00Z,Run,Renamed,,,,1800,5000,false,false,false",
            ORIGINAL[1],
            "999,2024-03-03T07:30:00Z,Swim,Pool,,,,1200,1000,false,false,false",
        ];
        let fixture = Fixture::new(BatchOptions::default(), &updated);
        let err = fixture.run().await.unwrap_err();

        assert!(format!("{err:#}").contains("row 3: activity ID 999 not found in original set"));
        assert!(fixture.sync.api().calls().is_empty());
    }

    #[tokio::test]
    async fn test_immutable_change_stops_batch() {
        let updated = [
            "100,2024-03-01T07:30:00Z,Run,Renamed,,,,1800,5000,false,false,false",
            "101,2024-03-02T07:30:00Z,Ride,Lunch Ride,,,b1,3600,25000,false,false,false",
            "102,2024-03-03T07:30:00Z,Swim,Renamed Pool,,,,1200,1000,false,false,false",
        ];
        let fixture = Fixture::new(BatchOptions::default(), &updated);
        let err = fixture.run().await.unwrap_err();

        let batch = err.downcast_ref::<BatchError>().unwrap();
        assert_eq!(batch.row, 2);
        assert!(err.to_string().contains("sorry, can't modify Distance"));
        assert_eq!(fixture.sync.api().writes(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_classifies_like_live_run() {
        let updated = [
            ORIGINAL[0],
            "101,2024-03-02T07:30:00Z,Ride,Lunch Ride,,,b1,3600,20000,false,false,true",
            "0,2024-03-05T07:30:00Z,Walk,New Walk,,,,600,800,false,false,false",
        ];
        let dry = Fixture::new(
            BatchOptions {
                dry_run: true,
                ..Default::default()
            },
            &updated,
        );
        let live = Fixture::new(BatchOptions::default(), &updated);

        let planned = dry.run().await.unwrap();
        let performed = live.run().await.unwrap();

        assert!(dry.sync.api().calls().is_empty());
        assert_eq!(planned.created, performed.created);
        assert_eq!(planned.updated, performed.updated);
        assert_eq!(planned.skipped, performed.skipped);
        assert_eq!(live.sync.api().writes(), 2);
    }
}
