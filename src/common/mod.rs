pub mod csv_codec;
pub mod error;
pub mod strava_client;

#[cfg(test)]
pub(crate) mod mock_api;
