use super::batch::{Action, BatchRunner, BatchSummary, RowHandler, SkipReason};
use super::validate::verify_for_create;
use super::{ActivitySync, report};
use crate::common::csv_codec::{load_csv, write_csv};
use crate::common::error::SyncError;
use crate::common::strava_client::{ActivityApi, NewActivity};
use crate::records::ActivityRecord;
use anyhow::{Context, Result};
use chrono::SecondsFormat;
use std::path::Path;
use tracing::info;

impl From<&ActivityRecord> for NewActivity {
    fn from(record: &ActivityRecord) -> Self {
        NewActivity {
            name: record.name.clone(),
            activity_type: record.activity_type.clone(),
            start_date_local: record
                .start
                .map(|start| start.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            elapsed_time: record.duration.unwrap_or_default(),
            description: Some(record.description.clone()).filter(|d| !d.is_empty()),
            distance: record.distance.filter(|d| *d != 0.0),
            workout_type: record.workout_type,
            trainer: record.trainer.then_some(1),
            commute: record.commute.then_some(1),
        }
    }
}

/// Creates `record` remotely and stores the assigned identifier on it.
pub(super) async fn create_record<A: ActivityApi>(
    api: &A,
    record: &mut ActivityRecord,
) -> Result<u64, SyncError> {
    let created = api.create_activity(&NewActivity::from(&*record)).await?;
    info!("Created activity {} ({})", created.id, created.name);
    record.id = Some(created.id);
    Ok(created.id)
}

struct CreateHandler<'a, A> {
    api: &'a A,
}

impl<A: ActivityApi> RowHandler for CreateHandler<'_, A> {
    type Row = ActivityRecord;

    fn plan(&self, record: &ActivityRecord) -> Result<Action, SyncError> {
        if record.remote_id().is_some() {
            return Ok(Action::Skip(SkipReason::AlreadyCreated));
        }
        verify_for_create(record)?;
        Ok(Action::Create)
    }

    async fn apply(&mut self, record: &mut ActivityRecord, _action: Action) -> Result<u64, SyncError> {
        create_record(self.api, record).await
    }
}

impl<A: ActivityApi> ActivitySync<A> {
    /// Creates every row of `input` that has no ID yet, then writes all rows
    /// (with assigned IDs) to `output`, or stdout when `output` is `None`.
    pub async fn create_activities(
        &self,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<BatchSummary> {
        let mut records: Vec<ActivityRecord> = load_csv(input)?;
        println!(
            "Found {} activities in {:?} to upload.",
            records.len(),
            input
        );

        let mut handler = CreateHandler { api: &self.api };
        let result = BatchRunner::new(self.options)
            .run(&mut handler, &mut records)
            .await;

        // Written even after a failure so that a resumed run skips created rows.
        let written = write_csv(output, &records).context("failed to write results");
        let summary = result?;
        written?;

        report(&summary, summary.created, "Created", "created");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_sync::BatchError;
    use crate::activity_sync::batch::BatchOptions;
    use crate::activity_sync::validate::Catalog;
    use crate::common::csv_codec::load_csv;
    use crate::common::mock_api::{Call, MockApi};

    const INPUT: &str = "\
ID,Start,Type,Name,Description,Duration (seconds),Distance,Private?,Commute?,Trainer?
,2024-03-01T07:30:00Z,Run,Morning Run,easy,1800,5000,false,false,false
77,2024-03-02T07:30:00Z,Run,Already There,,1800,5000,false,false,false
,2024-03-03T07:30:00Z,Ride,Trainer Ride,,3600,,false,false,true
,2024-03-04T07:30:00Z,Ride,,,3600,,false,false,false
";

    fn setup(options: BatchOptions) -> (tempfile::TempDir, ActivitySync<MockApi>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("in.csv"), INPUT).unwrap();
        let sync = ActivitySync::new(MockApi::default(), Catalog::default(), options);
        (dir, sync)
    }

    #[test]
    fn test_new_activity_from_record() {
        let record = ActivityRecord {
            start: Some("2024-03-01T07:30:00Z".parse().unwrap()),
            activity_type: "Ride".to_string(),
            name: "Spin".to_string(),
            duration: Some(3600),
            distance: Some(0.0),
            trainer: true,
            ..Default::default()
        };
        let new = NewActivity::from(&record);
        assert_eq!(new.start_date_local, "2024-03-01T07:30:00Z");
        assert_eq!(new.elapsed_time, 3600);
        assert_eq!(new.distance, None);
        assert_eq!(new.description, None);
        assert_eq!(new.trainer, Some(1));
        assert_eq!(new.commute, None);
    }

    #[tokio::test]
    async fn test_create_stops_at_invalid_row_and_writes_ids() {
        let (dir, sync) = setup(BatchOptions::default());
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");

        let err = sync
            .create_activities(&input, Some(&output))
            .await
            .unwrap_err();

        let batch = err.downcast_ref::<BatchError>().unwrap();
        assert_eq!(batch.row, 4);
        assert!(err.to_string().contains("missing Name"));
        assert!(err.to_string().contains("--start_row 5"));

        assert_eq!(sync.api().writes(), 2);
        let written: Vec<ActivityRecord> = load_csv(&output).unwrap();
        assert_eq!(written.len(), 4);
        assert_eq!(written[0].remote_id(), Some(1001));
        assert_eq!(written[1].remote_id(), Some(77));
        assert_eq!(written[2].remote_id(), Some(1002));
        assert_eq!(written[3].remote_id(), None);
    }

    #[tokio::test]
    async fn test_create_resumes_after_fixing_input() {
        let options = BatchOptions {
            start_row: 3,
            max: Some(1),
            ..Default::default()
        };
        let (dir, sync) = setup(options);
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");

        let summary = sync
            .create_activities(&input, Some(&output))
            .await
            .unwrap();

        assert_eq!(summary.created, 1);
        assert!(summary.stopped_at_max);
        let calls = sync.api().calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::Create(new) if new.name == "Trainer Ride"));
    }

    #[tokio::test]
    async fn test_create_dry_run_makes_no_calls() {
        let options = BatchOptions {
            dry_run: true,
            max: Some(2),
            ..Default::default()
        };
        let (dir, sync) = setup(options);
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");

        let summary = sync
            .create_activities(&input, Some(&output))
            .await
            .unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.skipped, 1);
        assert!(sync.api().calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_surfaces_service_error() {
        let (dir, sync) = setup(BatchOptions::default());
        sync.api().fail_write(1);
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");

        let err = sync
            .create_activities(&input, Some(&output))
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("failed to create activity [Morning Run on 2024-03-01] on row 1"));
        assert!(message.contains("HTTP 400 Bad Request"));
        assert!(message.contains("Bad Request\"}"));
        assert!(!message.contains("--start_row"));
    }
}
