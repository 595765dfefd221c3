use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use expeditious::config::Config;
use expeditious::fetch::HttpFetcher;
use expeditious::format;
use expeditious::logging;
use expeditious::merge::MergeSources;
use expeditious::pipeline::{Pipeline, TrimRequest};
use expeditious::process::ProcessRunner;

#[derive(Parser)]
#[command(name = "expeditious", version, about = "Trim and merge audio tracks with replayable metadata sidecars")]
struct Cli {
    /// Configuration file (default: ./expeditious.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Cut a window out of a track, with fade-out and peak normalization
    Trim {
        input: PathBuf,

        /// Window start in seconds
        #[arg(short, long, default_value_t = 0.0)]
        start: f64,

        /// Window length in seconds
        #[arg(short, long, default_value_t = 45.0)]
        duration: f64,

        /// Output file (default: <stem>_trimmed.flac next to the input)
        #[arg(short = 'f', long = "file")]
        output: Option<PathBuf>,

        /// Output as JSON instead of table
        #[arg(long)]
        json: bool,
    },

    /// Concatenate songs with silence between them into one compilation
    Merge {
        songs: Vec<PathBuf>,

        /// Fetch the song list and songs from the configured URLs
        #[arg(long, conflicts_with = "songs")]
        remote: bool,

        /// Date used to name the compilation (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Output as JSON instead of table
        #[arg(long)]
        json: bool,
    },

    /// Re-encode a tagged track into every configured format
    Convert { input: PathBuf },

    /// Re-run a trim or merge from its sidecar
    Replay { sidecar: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.quiet);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let runner = ProcessRunner::new(config.tools.command_timeout());
    let fetcher = HttpFetcher::new(config.merge.fetch_timeout())?;
    let pipeline = Pipeline::new(&config, &runner, &fetcher);

    match cli.command {
        Command::Trim {
            input,
            start,
            duration,
            output,
            json,
        } => {
            let outcome = pipeline.trim(&TrimRequest {
                input,
                start_seconds: start,
                duration_seconds: duration,
                output,
            })?;
            if json {
                println!("{}", format::format_json(&outcome.report));
            } else {
                println!(
                    "{}",
                    format::format_report(&outcome.report, &outcome.sidecar, &outcome.invocations)
                );
            }
        }
        Command::Merge {
            songs,
            remote,
            date,
            json,
        } => {
            let sources = if remote {
                MergeSources::Remote
            } else {
                MergeSources::Local(songs)
            };
            let now = Local::now().naive_local();
            let run_at = date.map(|d| d.and_time(now.time())).unwrap_or(now);

            let summary = pipeline.merge(&sources, run_at)?;
            if json {
                println!("{}", format::format_json(&summary.report));
            } else {
                println!(
                    "{}",
                    format::format_report(&summary.report, &summary.sidecar, &summary.outcome.invocations)
                );
            }
        }
        Command::Convert { input } => {
            let outcome = pipeline.convert(&input)?;
            println!("{}", format::format_convert(&outcome));
        }
        Command::Replay { sidecar } => {
            let report = pipeline.replay(&sidecar)?;
            println!("{}", format::format_json(&report));
        }
    }

    Ok(())
}
