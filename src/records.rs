use crate::common::error::SyncError;
use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// A row type that can be read from and written to a CSV file.
///
/// `HEADERS` must list the serialized column names in field order; it is used
/// to print the header even when there are no rows to write.
pub trait CsvRow: Serialize + DeserializeOwned {
    const HEADERS: &'static [&'static str];
}

/// One column of an [`ActivityRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Start,
    ActivityType,
    Name,
    Description,
    WorkoutType,
    GearId,
    Duration,
    Distance,
    Private,
    Commute,
    Trainer,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Id => "ID",
            Field::Start => "Start",
            Field::ActivityType => "Type",
            Field::Name => "Name",
            Field::Description => "Description",
            Field::WorkoutType => "Workout Type",
            Field::GearId => "Gear ID",
            Field::Duration => "Duration",
            Field::Distance => "Distance",
            Field::Private => "Private",
            Field::Commute => "Commute",
            Field::Trainer => "Trainer",
        };
        f.write_str(name)
    }
}

/// A single activity as exchanged by `download`, `create` and `update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(rename = "ID", default)]
    pub id: Option<u64>,
    #[serde(rename = "Start", default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(rename = "Type", alias = "Activity Type", default)]
    pub activity_type: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Workout Type", default)]
    pub workout_type: Option<u32>,
    #[serde(rename = "Gear ID", default)]
    pub gear_id: String,
    #[serde(rename = "Duration (seconds)", alias = "Duration", default)]
    pub duration: Option<u32>,
    #[serde(rename = "Distance", default)]
    pub distance: Option<f64>,
    #[serde(rename = "Private?", default, deserialize_with = "flag")]
    pub private: bool,
    #[serde(rename = "Commute?", default, deserialize_with = "flag")]
    pub commute: bool,
    #[serde(rename = "Trainer?", default, deserialize_with = "flag")]
    pub trainer: bool,
}

impl CsvRow for ActivityRecord {
    const HEADERS: &'static [&'static str] = &[
        "ID",
        "Start",
        "Type",
        "Name",
        "Description",
        "Workout Type",
        "Gear ID",
        "Duration (seconds)",
        "Distance",
        "Private?",
        "Commute?",
        "Trainer?",
    ];
}

impl ActivityRecord {
    /// The identifier assigned by the service; `None` until the activity is created.
    pub fn remote_id(&self) -> Option<u64> {
        self.id.filter(|id| *id != 0)
    }

    /// Lists every field whose value differs from `other`, in column order.
    ///
    /// This is the single equality contract for records; every field is
    /// destructured so a new field cannot be silently left out.
    pub fn changed_fields(&self, other: &ActivityRecord) -> Vec<Field> {
        let ActivityRecord {
            id,
            start,
            activity_type,
            name,
            description,
            workout_type,
            gear_id,
            duration,
            distance,
            private,
            commute,
            trainer,
        } = self;

        let mut changed = Vec::new();
        if id.filter(|id| *id != 0) != other.remote_id() {
            changed.push(Field::Id);
        }
        if *start != other.start {
            changed.push(Field::Start);
        }
        if *activity_type != other.activity_type {
            changed.push(Field::ActivityType);
        }
        if *name != other.name {
            changed.push(Field::Name);
        }
        if *description != other.description {
            changed.push(Field::Description);
        }
        if *workout_type != other.workout_type {
            changed.push(Field::WorkoutType);
        }
        if *gear_id != other.gear_id {
            changed.push(Field::GearId);
        }
        if *duration != other.duration {
            changed.push(Field::Duration);
        }
        if *distance != other.distance {
            changed.push(Field::Distance);
        }
        if *private != other.private {
            changed.push(Field::Private);
        }
        if *commute != other.commute {
            changed.push(Field::Commute);
        }
        if *trainer != other.trainer {
            changed.push(Field::Trainer);
        }
        changed
    }
}

impl PartialEq for ActivityRecord {
    fn eq(&self, other: &Self) -> bool {
        self.changed_fields(other).is_empty()
    }
}

impl fmt::Display for ActivityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.name)?;
        if let Some(start) = self.start {
            write!(f, " on {}", start.format(DAY_FORMAT))?;
        }
        if let Some(id) = self.remote_id() {
            write!(f, " (ID={id})")?;
        }
        f.write_str("]")
    }
}

/// A manual activity (no data file) for `uploadmanual`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualActivity {
    #[serde(rename = "Start", default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(rename = "Activity Type", alias = "Type", default)]
    pub activity_type: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Workout Type", default)]
    pub workout_type: Option<u32>,
    #[serde(rename = "Duration", alias = "Duration (seconds)", default)]
    pub duration: Option<u32>,
    #[serde(rename = "Distance", default)]
    pub distance: Option<f64>,
    #[serde(rename = "Commute?", default, deserialize_with = "flag")]
    pub commute: bool,
    #[serde(rename = "Trainer?", default, deserialize_with = "flag")]
    pub trainer: bool,
}

impl CsvRow for ManualActivity {
    const HEADERS: &'static [&'static str] = &[
        "Start",
        "Activity Type",
        "Name",
        "Description",
        "Workout Type",
        "Duration",
        "Distance",
        "Commute?",
        "Trainer?",
    ];
}

impl fmt::Display for ManualActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            Some(start) => write!(f, "[{} on {}]", self.name, start.format(DAY_FORMAT)),
            None => write!(f, "[{}]", self.name),
        }
    }
}

/// A data-file upload for `upload`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadActivity {
    #[serde(rename = "External ID", default)]
    pub external_id: String,
    #[serde(rename = "Activity Type", default)]
    pub activity_type: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Commute?", default, deserialize_with = "flag")]
    pub commute: bool,
    #[serde(rename = "Trainer?", default, deserialize_with = "flag")]
    pub trainer: bool,
    #[serde(rename = "File Type", default)]
    pub file_type: String,
    #[serde(rename = "Filename", default)]
    pub filename: PathBuf,
}

impl CsvRow for UploadActivity {
    const HEADERS: &'static [&'static str] = &[
        "External ID",
        "Activity Type",
        "Name",
        "Description",
        "Commute?",
        "Trainer?",
        "File Type",
        "Filename",
    ];
}

impl fmt::Display for UploadActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} from {}]", self.name, self.filename.display())
    }
}

/// Accepts blank as false, plus `true`/`false`/`1`/`0` in any case.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" => Ok(false),
        "true" | "1" => Ok(true),
        other => Err(de::Error::custom(format!(
            "invalid boolean {other:?} (expected true or false)"
        ))),
    }
}

/// Ordered records plus an identifier index, built fresh from each CSV read.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<ActivityRecord>,
    by_id: HashMap<u64, usize>,
}

impl RecordSet {
    pub fn new(records: Vec<ActivityRecord>) -> Result<Self, SyncError> {
        let mut by_id = HashMap::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            if let Some(id) = record.remote_id() {
                if by_id.insert(id, index).is_some() {
                    return Err(SyncError::DuplicateId { id, row: index + 1 });
                }
            }
        }
        Ok(Self { records, by_id })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&ActivityRecord> {
        self.by_id.get(&id).map(|index| &self.records[*index])
    }

    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    /// Mutable access for echoing results. The index reflects the set as
    /// loaded; identifiers assigned afterwards are not indexed.
    pub fn records_mut(&mut self) -> &mut [ActivityRecord] {
        &mut self.records
    }

    pub fn into_records(self) -> Vec<ActivityRecord> {
        self.records
    }
}
