use super::batch::{Action, BatchRunner, BatchSummary, RowHandler};
use super::validate::{Catalog, verify_manual};
use super::{ActivitySync, report};
use crate::common::csv_codec::load_csv;
use crate::common::error::SyncError;
use crate::common::strava_client::{ActivityApi, NewActivity};
use crate::records::ManualActivity;
use anyhow::Result;
use chrono::SecondsFormat;
use std::path::Path;
use tracing::info;

impl From<&ManualActivity> for NewActivity {
    fn from(activity: &ManualActivity) -> Self {
        NewActivity {
            name: activity.name.clone(),
            activity_type: activity.activity_type.clone(),
            start_date_local: activity
                .start
                .map(|start| start.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            elapsed_time: activity.duration.unwrap_or_default(),
            description: Some(activity.description.clone()).filter(|d| !d.is_empty()),
            distance: activity.distance.filter(|d| *d != 0.0),
            workout_type: activity.workout_type,
            trainer: activity.trainer.then_some(1),
            commute: activity.commute.then_some(1),
        }
    }
}

struct ManualHandler<'a, A> {
    api: &'a A,
    catalog: &'a Catalog,
}

impl<A: ActivityApi> RowHandler for ManualHandler<'_, A> {
    type Row = ManualActivity;

    fn plan(&self, activity: &ManualActivity) -> Result<Action, SyncError> {
        verify_manual(activity, self.catalog)?;
        Ok(Action::Create)
    }

    async fn apply(&mut self, activity: &mut ManualActivity, _action: Action) -> Result<u64, SyncError> {
        let created = self.api.create_activity(&NewActivity::from(&*activity)).await?;
        info!("Created manual activity {} ({})", created.id, created.name);
        Ok(created.id)
    }
}

impl<A: ActivityApi> ActivitySync<A> {
    /// Creates one manual activity (no data file) per row of `input`.
    pub async fn upload_manual_activities(&self, input: &Path) -> Result<BatchSummary> {
        let mut activities: Vec<ManualActivity> = load_csv(input)?;
        println!(
            "Found {} activities in {:?} to upload.",
            activities.len(),
            input
        );

        let mut handler = ManualHandler {
            api: &self.api,
            catalog: &self.catalog,
        };
        let summary = BatchRunner::new(self.options)
            .run(&mut handler, &mut activities)
            .await?;

        report(&summary, summary.created, "Created", "created");
        Ok(summary)
    }
}
