use crate::common::strava_client::{ActivityApi, PollPolicy};

pub mod batch;
pub mod reconcile;
pub mod validate;

mod create;
mod manual;
mod update;
mod upload;

pub use batch::{BatchError, BatchOptions, BatchSummary};
use validate::Catalog;

/// Runs the bulk create/update/upload commands against an [`ActivityApi`].
pub struct ActivitySync<A> {
    api: A,
    catalog: Catalog,
    options: BatchOptions,
    poll: PollPolicy,
}

impl<A: ActivityApi> ActivitySync<A> {
    pub fn new(api: A, catalog: Catalog, options: BatchOptions) -> Self {
        Self {
            api,
            catalog,
            options,
            poll: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}

fn report(summary: &BatchSummary, count: usize, done: &str, pending: &str) {
    if summary.dry_run {
        println!("Found {count} activities to be {pending}.");
    } else {
        println!("{done} {count} activities.");
    }
}
