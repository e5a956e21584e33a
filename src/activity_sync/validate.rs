use crate::records::{ActivityRecord, Field, ManualActivity, UploadActivity};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

/// Fields that cannot be changed once an activity exists, in reporting order.
pub const IMMUTABLE_ON_UPDATE: [Field; 4] =
    [Field::Start, Field::Duration, Field::Distance, Field::Private];

const ACTIVITY_TYPES: &[&str] = &[
    "AlpineSki",
    "BackcountrySki",
    "Canoeing",
    "Crossfit",
    "EBikeRide",
    "Elliptical",
    "Golf",
    "Handcycle",
    "Hike",
    "IceSkate",
    "InlineSkate",
    "Kayaking",
    "Kitesurf",
    "NordicSki",
    "Ride",
    "RockClimbing",
    "RollerSki",
    "Rowing",
    "Run",
    "Sail",
    "Skateboard",
    "Snowboard",
    "Snowshoe",
    "Soccer",
    "StairStepper",
    "StandUpPaddling",
    "Surfing",
    "Swim",
    "Velomobile",
    "VirtualRide",
    "VirtualRun",
    "Walk",
    "WeightTraining",
    "Wheelchair",
    "Windsurf",
    "Workout",
    "Yoga",
];

const FILE_TYPES: &[&str] = &["fit", "fit.gz", "tcx", "tcx.gz", "gpx", "gpx.gz"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("ID must be set for update")]
    MissingId,
    #[error("sorry, can't set {0}")]
    Restricted(Field),
    #[error("sorry, can't modify {0}")]
    Immutable(Field),
    #[error("invalid Activity Type {0:?}")]
    ActivityType(String),
    #[error("invalid File Type {0:?}")]
    FileType(String),
    #[error("Filename {0:?} not found")]
    FileNotFound(PathBuf),
}

/// The allowed activity and file types, built once at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    activity_types: HashSet<&'static str>,
    file_types: HashSet<&'static str>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            activity_types: ACTIVITY_TYPES.iter().copied().collect(),
            file_types: FILE_TYPES.iter().copied().collect(),
        }
    }
}

impl Catalog {
    pub fn is_activity_type(&self, activity_type: &str) -> bool {
        self.activity_types.contains(activity_type)
    }

    pub fn is_file_type(&self, file_type: &str) -> bool {
        self.file_types.contains(file_type)
    }

    fn check_activity_type(&self, activity_type: &str) -> Result<(), ValidationError> {
        if activity_type.is_empty() {
            return Err(ValidationError::Missing("Activity Type"));
        }
        if !self.is_activity_type(activity_type) {
            return Err(ValidationError::ActivityType(activity_type.to_string()));
        }
        Ok(())
    }
}

/// Checks that `record` can be created as a new activity.
pub fn verify_for_create(record: &ActivityRecord) -> Result<(), ValidationError> {
    if record.start.is_none() {
        return Err(ValidationError::Missing("Start"));
    }
    if record.name.is_empty() {
        return Err(ValidationError::Missing("Name"));
    }
    // The service rejects private activities on create.
    if record.private {
        return Err(ValidationError::Restricted(Field::Private));
    }
    Ok(())
}

/// Checks that `record` is an allowed modification of `prev`.
pub fn verify_for_update(
    record: &ActivityRecord,
    prev: &ActivityRecord,
) -> Result<(), ValidationError> {
    if record.remote_id().is_none() {
        return Err(ValidationError::MissingId);
    }
    let changed = record.changed_fields(prev);
    match IMMUTABLE_ON_UPDATE
        .into_iter()
        .find(|field| changed.contains(field))
    {
        Some(field) => Err(ValidationError::Immutable(field)),
        None => Ok(()),
    }
}

pub fn verify_manual(activity: &ManualActivity, catalog: &Catalog) -> Result<(), ValidationError> {
    if activity.start.is_none() {
        return Err(ValidationError::Missing("Start"));
    }
    catalog.check_activity_type(&activity.activity_type)?;
    if activity.name.is_empty() {
        return Err(ValidationError::Missing("Name"));
    }
    Ok(())
}

pub fn verify_upload(activity: &UploadActivity, catalog: &Catalog) -> Result<(), ValidationError> {
    catalog.check_activity_type(&activity.activity_type)?;
    if activity.name.is_empty() {
        return Err(ValidationError::Missing("Name"));
    }
    if activity.file_type.is_empty() {
        return Err(ValidationError::Missing("File Type"));
    }
    if !catalog.is_file_type(&activity.file_type) {
        return Err(ValidationError::FileType(activity.file_type.clone()));
    }
    if activity.filename.as_os_str().is_empty() {
        return Err(ValidationError::Missing("Filename"));
    }
    if !activity.filename.is_file() {
        return Err(ValidationError::FileNotFound(activity.filename.clone()));
    }
    Ok(())
}
