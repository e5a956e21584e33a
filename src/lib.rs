pub mod activity_sync;
pub mod auth;
pub mod cli;
pub mod common;
pub mod download;
pub mod records;
