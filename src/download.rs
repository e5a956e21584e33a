use crate::common::error::SyncError;
use crate::common::strava_client::{ActivityApi, ListQuery, SummaryActivity};
use crate::records::{ActivityRecord, CsvRow, DAY_FORMAT};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

pub const PAGE_SIZE: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Stop after this many activities; `None` downloads everything.
    pub max: Option<usize>,
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub page_size: u32,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max: None,
            before: None,
            after: None,
            page_size: PAGE_SIZE,
        }
    }
}

/// Parses a `YYYY-MM-DD` day as midnight UTC.
pub fn parse_day(day: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let date = NaiveDate::parse_from_str(day, DAY_FORMAT)?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

impl From<SummaryActivity> for ActivityRecord {
    fn from(activity: SummaryActivity) -> Self {
        ActivityRecord {
            id: Some(activity.id),
            start: Some(activity.start_date),
            activity_type: activity.activity_type,
            name: activity.name,
            description: String::new(),
            workout_type: activity.workout_type,
            gear_id: activity.gear_id.unwrap_or_default(),
            duration: Some(activity.elapsed_time),
            distance: Some(activity.distance),
            private: activity.private,
            commute: activity.commute,
            trainer: activity.trainer,
        }
    }
}

/// Pages through the athlete's activities, writing one CSV row per activity
/// as soon as it arrives. Returns the number of rows written.
pub async fn download_activities<A: ActivityApi, W: Write>(
    api: &A,
    options: &DownloadOptions,
    writer: W,
) -> Result<usize, SyncError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(ActivityRecord::HEADERS)?;
    wtr.flush().map_err(csv::Error::from)?;

    let mut handled = 0;
    let mut page = 1;
    'pages: loop {
        let query = ListQuery {
            page,
            per_page: options.page_size,
            before: options.before.map(|t| t.timestamp()),
            after: options.after.map(|t| t.timestamp()),
        };
        let activities = api.list_activities(&query).await?;
        let fetched = activities.len();

        for activity in activities {
            if options.max.is_some_and(|max| handled >= max) {
                break 'pages;
            }
            wtr.serialize(ActivityRecord::from(activity))?;
            wtr.flush().map_err(csv::Error::from)?;
            handled += 1;
        }

        if fetched < options.page_size as usize || options.max.is_some_and(|max| handled >= max) {
            break;
        }
        info!("Handled {handled} activities, fetching next page...");
        page += 1;
    }

    info!("Downloaded {handled} activities");
    Ok(handled)
}

/// Downloads to `output`, or stdout when no path is given.
pub async fn download<A: ActivityApi>(
    api: &A,
    options: &DownloadOptions,
    output: Option<&Path>,
) -> Result<usize> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("failed to create {path:?}"))?;
            Ok(download_activities(api, options, file).await?)
        }
        None => Ok(download_activities(api, options, io::stdout()).await?),
    }
}
