use super::batch::{Action, BatchRunner, BatchSummary, RowHandler};
use super::validate::{Catalog, verify_upload};
use super::{ActivitySync, report};
use crate::common::csv_codec::load_csv;
use crate::common::error::SyncError;
use crate::common::strava_client::{ActivityApi, NewUpload, PollPolicy, await_upload};
use crate::records::UploadActivity;
use anyhow::Result;
use std::path::Path;
use tracing::info;

struct UploadHandler<'a, A> {
    api: &'a A,
    catalog: &'a Catalog,
    poll: PollPolicy,
}

impl<A: ActivityApi> RowHandler for UploadHandler<'_, A> {
    type Row = UploadActivity;

    fn plan(&self, activity: &UploadActivity) -> Result<Action, SyncError> {
        verify_upload(activity, self.catalog)?;
        Ok(Action::Upload)
    }

    async fn apply(&mut self, activity: &mut UploadActivity, _action: Action) -> Result<u64, SyncError> {
        let data = tokio::fs::read(&activity.filename)
            .await
            .map_err(|source| SyncError::Open {
                path: activity.filename.clone(),
                source,
            })?;
        let file_name = activity
            .filename
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let upload = self
            .api
            .create_upload(NewUpload {
                file_name,
                data,
                data_type: activity.file_type.clone(),
                activity_type: activity.activity_type.clone(),
                name: activity.name.clone(),
                description: activity.description.clone(),
                external_id: activity.external_id.clone(),
                commute: activity.commute,
                trainer: activity.trainer,
            })
            .await?;
        info!(upload_id = upload.id, "Waiting for upload to be processed");

        Ok(await_upload(self.api, upload, self.poll).await?)
    }
}

impl<A: ActivityApi> ActivitySync<A> {
    /// Uploads the data file named on each row of `input` and waits for the
    /// service to turn it into an activity.
    pub async fn upload_activities(&self, input: &Path) -> Result<BatchSummary> {
        let mut activities: Vec<UploadActivity> = load_csv(input)?;
        println!(
            "Found {} activities in {:?} to upload.",
            activities.len(),
            input
        );

        let mut handler = UploadHandler {
            api: &self.api,
            catalog: &self.catalog,
            poll: self.poll,
        };
        let summary = BatchRunner::new(self.options)
            .run(&mut handler, &mut activities)
            .await?;

        report(&summary, summary.uploaded, "Uploaded", "uploaded");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_sync::BatchError;
    use crate::activity_sync::batch::BatchOptions;
    use crate::common::mock_api::{Call, MockApi};
    use crate::common::strava_client::Upload;
    use std::time::Duration;

    fn setup(options: BatchOptions, rows: &[&str]) -> (tempfile::TempDir, ActivitySync<MockApi>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ride.fit"), b"fit-data").unwrap();
        std::fs::write(dir.path().join("run.gpx.gz"), b"gpx-data").unwrap();

        let mut csv = String::from(
            "External ID,Activity Type,Name,Description,Commute?,Trainer?,File Type,Filename\n",
        );
        for row in rows {
            csv.push_str(&row.replace("{dir}", &dir.path().display().to_string()));
            csv.push('\n');
        }
        std::fs::write(dir.path().join("upload.csv"), csv).unwrap();

        let sync = ActivitySync::new(MockApi::default(), Catalog::default(), options)
            .with_poll_policy(PollPolicy {
                interval: Duration::ZERO,
                max_polls: Some(5),
            });
        (dir, sync)
    }

    #[tokio::test]
    async fn test_uploads_and_polls_each_file() {
        let (dir, sync) = setup(
            BatchOptions::default(),
            &[
                "r1,Ride,Morning Ride,,false,false,fit,{dir}/ride.fit",
                "r2,Run,Evening Run,,true,false,gpx.gz,{dir}/run.gpx.gz",
            ],
        );
        sync.api().push_upload_status(Upload {
            id: 1001,
            status: Some("Your activity is still being processed.".to_string()),
            ..Default::default()
        });

        let summary = sync
            .upload_activities(&dir.path().join("upload.csv"))
            .await
            .unwrap();

        assert_eq!(summary.uploaded, 2);
        assert_eq!(
            sync.api().calls(),
            vec![
                Call::CreateUpload("ride.fit".to_string()),
                Call::GetUpload(1001),
                Call::GetUpload(1001),
                Call::CreateUpload("run.gpx.gz".to_string()),
                Call::GetUpload(1002),
            ]
        );
    }

    #[tokio::test]
    async fn test_processing_error_stops_batch() {
        let (dir, sync) = setup(
            BatchOptions::default(),
            &[
                "r1,Ride,Morning Ride,,false,false,fit,{dir}/ride.fit",
                "r2,Run,Evening Run,,false,false,gpx.gz,{dir}/run.gpx.gz",
            ],
        );
        sync.api().push_upload_status(Upload {
            id: 1001,
            activity_id: Some(9),
            ..Default::default()
        });
        sync.api().push_upload_status(Upload {
            id: 1002,
            error: Some("duplicate of activity 9".to_string()),
            ..Default::default()
        });

        let err = sync
            .upload_activities(&dir.path().join("upload.csv"))
            .await
            .unwrap_err();

        let batch = err.downcast_ref::<BatchError>().unwrap();
        assert_eq!(batch.row, 2);
        let message = err.to_string();
        assert!(message.contains("failed to upload activity [Evening Run from"));
        assert!(message.contains("upload failed: duplicate of activity 9"));
        assert!(message.contains("--start_row 3"));
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_upload() {
        let (dir, sync) = setup(
            BatchOptions {
                dry_run: true,
                ..Default::default()
            },
            &["r1,Ride,Lost Ride,,false,false,fit,{dir}/missing.fit"],
        );

        let err = sync
            .upload_activities(&dir.path().join("upload.csv"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("not found"));
        assert!(sync.api().calls().is_empty());
    }
}
