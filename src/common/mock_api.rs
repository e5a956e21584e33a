//! In-memory `ActivityApi` used by unit tests.

use crate::common::strava_client::{
    ActivityApi, ActivityUpdate, ApiError, CreatedActivity, ListQuery, NewActivity, NewUpload,
    SummaryActivity, Upload,
};
use reqwest::StatusCode;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(ListQuery),
    Create(NewActivity),
    Update(u64, ActivityUpdate),
    CreateUpload(String),
    GetUpload(u64),
}

#[derive(Default)]
pub struct MockApi {
    calls: RefCell<Vec<Call>>,
    pages: RefCell<VecDeque<Vec<SummaryActivity>>>,
    upload_statuses: RefCell<VecDeque<Upload>>,
    writes: Cell<usize>,
    fail_write: Cell<Option<usize>>,
}

impl MockApi {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Number of create/update/upload calls made so far.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    pub fn push_page(&self, page: Vec<SummaryActivity>) {
        self.pages.borrow_mut().push_back(page);
    }

    pub fn push_upload_status(&self, upload: Upload) {
        self.upload_statuses.borrow_mut().push_back(upload);
    }

    /// Makes the `n`th write call (1-based) fail with a service error.
    pub fn fail_write(&self, n: usize) {
        self.fail_write.set(Some(n));
    }

    fn write(&self, call: Call) -> Result<u64, ApiError> {
        self.calls.borrow_mut().push(call);
        let n = self.writes.get() + 1;
        self.writes.set(n);
        if self.fail_write.get() == Some(n) {
            return Err(ApiError::Http {
                status: StatusCode::BAD_REQUEST,
                body: r#"{"message":"Bad Request"}"#.to_string(),
            });
        }
        Ok(1000 + n as u64)
    }
}

impl ActivityApi for MockApi {
    async fn list_activities(&self, query: &ListQuery) -> Result<Vec<SummaryActivity>, ApiError> {
        self.calls.borrow_mut().push(Call::List(query.clone()));
        Ok(self.pages.borrow_mut().pop_front().unwrap_or_default())
    }

    async fn create_activity(&self, activity: &NewActivity) -> Result<CreatedActivity, ApiError> {
        let id = self.write(Call::Create(activity.clone()))?;
        Ok(CreatedActivity {
            id,
            name: activity.name.clone(),
        })
    }

    async fn update_activity(
        &self,
        id: u64,
        update: &ActivityUpdate,
    ) -> Result<CreatedActivity, ApiError> {
        self.write(Call::Update(id, update.clone()))?;
        Ok(CreatedActivity {
            id,
            name: update.name.clone(),
        })
    }

    async fn create_upload(&self, upload: NewUpload) -> Result<Upload, ApiError> {
        let id = self.write(Call::CreateUpload(upload.file_name.clone()))?;
        Ok(Upload {
            id,
            status: Some("Your activity is still being processed.".to_string()),
            ..Default::default()
        })
    }

    async fn get_upload(&self, upload_id: u64) -> Result<Upload, ApiError> {
        self.calls.borrow_mut().push(Call::GetUpload(upload_id));
        Ok(self
            .upload_statuses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Upload {
                id: upload_id,
                activity_id: Some(upload_id + 5000),
                ..Default::default()
            }))
    }
}
