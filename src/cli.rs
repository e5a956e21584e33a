use crate::activity_sync::validate::Catalog;
use crate::activity_sync::{ActivitySync, BatchOptions};
use crate::auth::{AuthOptions, DEFAULT_PORT, authorize};
use crate::common::csv_codec::write_header;
use crate::common::strava_client::{
    ClientConfig, DEFAULT_API_BASE, DEFAULT_OAUTH_BASE, PollPolicy, StravaClient,
};
use crate::download::{DownloadOptions, download, parse_day};
use crate::records::{ActivityRecord, ManualActivity, UploadActivity};
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "stravasync",
    version,
    about = "Bulk download, create, update and upload Strava activities from CSV files"
)]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log as JSON lines instead of plain text
    #[arg(long = "log_json", global = true)]
    pub log_json: bool,

    #[arg(long = "api_base", env = "STRAVA_API_BASE", default_value = DEFAULT_API_BASE, hide = true, global = true)]
    api_base: String,

    #[arg(long = "oauth_base", env = "STRAVA_OAUTH_BASE", default_value = DEFAULT_OAUTH_BASE, hide = true, global = true)]
    oauth_base: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct TokenArgs {
    /// Access token printed by the auth command
    #[arg(long = "access_token", short = 't', env = "STRAVA_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Validate and report what would be sent without contacting Strava
    #[arg(long)]
    dryrun: bool,

    /// First data row to process (1-based, header not counted)
    #[arg(long = "start_row", default_value_t = 1, value_parser = parse_row)]
    start_row: usize,

    /// Stop after this many activities (0 = no limit)
    #[arg(long, default_value_t = 0)]
    max: usize,
}

impl From<BatchArgs> for BatchOptions {
    fn from(args: BatchArgs) -> Self {
        BatchOptions {
            start_row: args.start_row,
            dry_run: args.dryrun,
            max: limit(args.max),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authorize this tool in a browser and print an access token
    Auth {
        #[arg(long = "client_id", env = "STRAVA_CLIENT_ID")]
        client_id: String,
        #[arg(long = "client_secret", env = "STRAVA_CLIENT_SECRET", hide_env_values = true)]
        client_secret: String,
        /// Local port for the authorization redirect
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Request read-only access
        #[arg(long = "read_only")]
        read_only: bool,
    },
    /// Download activities to a CSV file that `update` can later compare against
    Download {
        #[command(flatten)]
        token: TokenArgs,
        /// Output file (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Only activities before this day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_day)]
        before: Option<DateTime<Utc>>,
        /// Only activities after this day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_day)]
        after: Option<DateTime<Utc>>,
        /// Stop after this many activities (0 = no limit)
        #[arg(long, default_value_t = 0)]
        max: usize,
    },
    /// Create an activity for every row without an ID
    Create {
        #[command(flatten)]
        token: TokenArgs,
        #[arg(long = "in")]
        input: PathBuf,
        /// Where to write the rows with their new IDs (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Push changes between a downloaded file and an edited copy of it
    Update {
        #[command(flatten)]
        token: TokenArgs,
        /// The file written by download
        #[arg(long)]
        orig: PathBuf,
        /// The edited copy
        #[arg(long)]
        updated: PathBuf,
        /// Where to write the updated rows with IDs for new activities
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Upload activity data files (FIT, TCX, GPX)
    Upload {
        #[command(flatten)]
        token: TokenArgs,
        #[arg(long = "in")]
        input: PathBuf,
        /// Give up on an upload after this many status checks
        #[arg(long = "max_polls")]
        max_polls: Option<u32>,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Create manual activities that have no data file
    #[command(name = "uploadmanual")]
    UploadManual {
        #[command(flatten)]
        token: TokenArgs,
        #[arg(long = "in")]
        input: PathBuf,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Print the CSV header used by download, create and update
    #[command(
        name = "createheader",
        long_about = "Print the CSV header used by download, create and update.\n\n\
            ID                  Strava activity ID; blank or 0 for activities not created yet\n\
            Start               start time, RFC 3339 (2024-03-01T07:30:00Z)\n\
            Type                activity type, e.g. Run or Ride\n\
            Name                activity name (required)\n\
            Description         free text\n\
            Workout Type        Strava workout type number\n\
            Gear ID             Strava gear ID, e.g. b1234\n\
            Duration (seconds)  elapsed time\n\
            Distance            meters\n\
            Private?            true/false; cannot be set on create or changed on update\n\
            Commute?            true/false\n\
            Trainer?            true/false\n\n\
            Start, Duration, Distance and Private cannot be changed by update."
    )]
    CreateHeader,
    /// Print the CSV header used by upload
    #[command(
        name = "uploadheader",
        long_about = "Print the CSV header used by upload.\n\n\
            External ID    your own identifier for the upload\n\
            Activity Type  activity type, e.g. Run or Ride (required)\n\
            Name           activity name (required)\n\
            Description    free text\n\
            Commute?       true/false\n\
            Trainer?       true/false\n\
            File Type      fit, fit.gz, tcx, tcx.gz, gpx or gpx.gz (required)\n\
            Filename       path to the data file, relative to the current directory"
    )]
    UploadHeader,
    /// Print the CSV header used by uploadmanual
    #[command(
        name = "uploadmanualheader",
        long_about = "Print the CSV header used by uploadmanual.\n\n\
            Start          start time, RFC 3339 (2024-01-02T18:00:00Z) (required)\n\
            Activity Type  activity type, e.g. Yoga or WeightTraining (required)\n\
            Name           activity name (required)\n\
            Description    free text\n\
            Workout Type   Strava workout type number\n\
            Duration       elapsed time in seconds\n\
            Distance       meters\n\
            Commute?       true/false\n\
            Trainer?       true/false"
    )]
    UploadManualHeader,
}

fn parse_row(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(row) if row >= 1 => Ok(row),
        _ => Err(format!("{value:?} is not a row number (rows start at 1)")),
    }
}

fn limit(max: usize) -> Option<usize> {
    (max > 0).then_some(max)
}

fn client(config: ClientConfig, token: &TokenArgs) -> StravaClient {
    let mut client = StravaClient::new(config);
    client.set_access_token(&token.access_token);
    client
}

fn activity_sync(config: ClientConfig, token: &TokenArgs, batch: BatchArgs) -> ActivitySync<StravaClient> {
    ActivitySync::new(client(config, token), Catalog::default(), batch.into())
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig {
        api_base: cli.api_base,
        oauth_base: cli.oauth_base,
    };

    match cli.command {
        Command::Auth {
            client_id,
            client_secret,
            port,
            read_only,
        } => {
            let options = AuthOptions {
                client_id,
                client_secret,
                port,
                read_only,
            };
            authorize(&StravaClient::new(config), &options).await?;
        }
        Command::Download {
            token,
            out,
            before,
            after,
            max,
        } => {
            let options = DownloadOptions {
                max: limit(max),
                before,
                after,
                ..Default::default()
            };
            let count = download(&client(config, &token), &options, out.as_deref()).await?;
            info!("Wrote {count} activities");
        }
        Command::Create {
            token,
            input,
            out,
            batch,
        } => {
            activity_sync(config, &token, batch)
                .create_activities(&input, out.as_deref())
                .await?;
        }
        Command::Update {
            token,
            orig,
            updated,
            out,
            batch,
        } => {
            activity_sync(config, &token, batch)
                .update_activities(&orig, &updated, out.as_deref())
                .await?;
        }
        Command::Upload {
            token,
            input,
            max_polls,
            batch,
        } => {
            let poll = PollPolicy {
                max_polls,
                ..Default::default()
            };
            activity_sync(config, &token, batch)
                .with_poll_policy(poll)
                .upload_activities(&input)
                .await?;
        }
        Command::UploadManual {
            token,
            input,
            batch,
        } => {
            activity_sync(config, &token, batch)
                .upload_manual_activities(&input)
                .await?;
        }
        Command::CreateHeader => write_header::<ActivityRecord, _>(io::stdout())?,
        Command::UploadHeader => write_header::<UploadActivity, _>(io::stdout())?,
        Command::UploadManualHeader => write_header::<ManualActivity, _>(io::stdout())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_original_flag_spelling() {
        let cli = Cli::try_parse_from([
            "stravasync",
            "update",
            "-t",
            "tok",
            "--orig",
            "a.csv",
            "--updated",
            "b.csv",
            "--dryrun",
            "--start_row",
            "4",
            "--debug",
        ])
        .unwrap();

        assert!(cli.debug);
        let Command::Update { token, batch, .. } = cli.command else {
            panic!("expected update");
        };
        assert_eq!(token.access_token, "tok");
        let options = BatchOptions::from(batch);
        assert_eq!(options.start_row, 4);
        assert!(options.dry_run);
        assert_eq!(options.max, None);
    }

    #[test]
    fn test_rejects_row_zero_and_bad_dates() {
        assert!(
            Cli::try_parse_from(["stravasync", "create", "-t", "x", "--in", "a.csv", "--start_row", "0"])
                .is_err()
        );
        assert!(
            Cli::try_parse_from(["stravasync", "download", "-t", "x", "--after", "2024-1-xx"]).is_err()
        );
    }

    #[test]
    fn test_download_dates_and_max() {
        let cli = Cli::try_parse_from([
            "stravasync",
            "download",
            "--access_token",
            "x",
            "--after",
            "2024-01-01",
            "--max",
            "10",
        ])
        .unwrap();
        let Command::Download { after, max, before, .. } = cli.command else {
            panic!("expected download");
        };
        assert_eq!(after, Some(parse_day("2024-01-01").unwrap()));
        assert_eq!(before, None);
        assert_eq!(limit(max), Some(10));
    }

    #[test]
    fn test_header_commands() {
        for name in ["createheader", "uploadheader", "uploadmanualheader"] {
            assert!(Cli::try_parse_from(["stravasync", name]).is_ok());
        }
    }
}
