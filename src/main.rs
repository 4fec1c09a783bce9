use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use indicatif::MultiProgress;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod document;
mod downloader;
mod error;
mod extractor;
mod models;
mod orchestrator;
mod progress;
mod resolver;
mod saturn;
mod shutdown;
mod utils;

#[cfg(test)]
mod test_support;

use config::{BATCH_FILE, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECS, DOWNLOAD_FOLDER, DownloaderConfig};
use models::{BatchSummary, SeriesTarget};
use orchestrator::Orchestrator;
use progress::SuspendingWriter;
use saturn::SaturnSite;
use shutdown::ShutdownCoordinator;

#[derive(Parser)]
#[command(name = "saturn-dl", version, about = "Batch episode downloader for AnimeSaturn catalogs")]
struct Cli {
    /// Series catalog URL; without it, URLs are read from the batch file
    url: Option<String>,

    /// First episode to download (1-based)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    start: Option<u32>,

    /// Last episode to download (inclusive)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    end: Option<u32>,

    /// Newline-delimited list of catalog URLs, each optionally followed by a start and end episode
    #[arg(short, long, default_value = BATCH_FILE)]
    batch_file: PathBuf,

    /// Episodes downloaded at the same time
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Root directory for the per-series folders
    #[arg(short, long, default_value = DOWNLOAD_FOLDER)]
    output: PathBuf,

    /// Connect and read timeout, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Write the final report as JSON to this file
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Hide progress bars
    #[arg(short, long)]
    quiet: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

// Logs go to stderr through the progress display so lines never tear the bars
fn init_tracing(verbose: bool, display: MultiProgress) {
    let default = if verbose { "saturn_dl=debug" } else { "saturn_dl=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(SuspendingWriter::new(display))
        .init();
}

const INTERRUPTED: u8 = 130;

fn exit_code(summary: &BatchSummary) -> ExitCode {
    if summary.interrupted {
        ExitCode::from(INTERRUPTED)
    } else if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let display = progress::progress_display(!cli.quiet);
    init_tracing(cli.verbose, display.clone());

    let targets = collect_targets(&cli)?;
    if targets.is_empty() {
        return Err(anyhow!("No series URLs in {}", cli.batch_file.display()));
    }

    let config = DownloaderConfig::default()
        .with_concurrency(cli.concurrency)
        .with_output_root(&cli.output)
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_progress(!cli.quiet);

    let client = api::build_client(&config).context("Failed to build HTTP client")?;
    let shutdown = ShutdownCoordinator::shared();
    shutdown::install_ctrl_c_handler(shutdown.clone());

    let site = Arc::new(SaturnSite::new(client.clone()));
    let orchestrator = Orchestrator::new(site, client, config, shutdown.clone()).with_display(display);

    let started = Instant::now();
    let summary = orchestrator.run(&targets).await;

    println!();
    println!("{}", summary);
    println!("Finished in {}", utils::format_duration(started.elapsed().as_secs()));

    if let Some(path) = &cli.summary_json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }

    Ok(exit_code(&summary))
}

// Single URL from the command line, or every line of the batch file
fn collect_targets(cli: &Cli) -> Result<Vec<SeriesTarget>> {
    if let Some(url) = &cli.url {
        let target = SeriesTarget::new(url.trim())
            .with_range(cli.start.map(|n| n as usize), cli.end.map(|n| n as usize));
        return Ok(vec![target]);
    }

    if cli.start.is_some() || cli.end.is_some() {
        warn!("--start/--end only apply to a single URL; use per-line ranges in the batch file");
    }
    load_batch_file(&cli.batch_file)
}

fn load_batch_file(path: &Path) -> Result<Vec<SeriesTarget>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    let targets = utils::parse_batch_file(&contents)
        .with_context(|| format!("Invalid batch file {}", path.display()))?;

    info!(count = targets.len(), path = %path.display(), "loaded batch file");
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DownloadError;
    use crate::models::SeriesReport;

    #[test]
    fn single_url_carries_range() {
        let cli = Cli::parse_from(["saturn-dl", "https://www.animesaturn.cx/anime/Frieren", "-s", "5", "-e", "10"]);
        let targets = collect_targets(&cli).unwrap();
        assert_eq!(
            targets,
            vec![SeriesTarget::new("https://www.animesaturn.cx/anime/Frieren").with_range(Some(5), Some(10))]
        );
    }

    #[test]
    fn zero_is_not_an_episode() {
        assert!(Cli::try_parse_from(["saturn-dl", "https://x.example/a", "--start", "0"]).is_err());
    }

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["saturn-dl"]);
        assert_eq!(cli.batch_file, PathBuf::from("URLs.txt"));
        assert_eq!(cli.output, PathBuf::from("Downloads"));
        assert_eq!(cli.concurrency, 3);
        assert_eq!(cli.timeout, 30);
    }

    #[test]
    fn batch_mode_reads_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("URLs.txt");
        std::fs::write(&path, "https://a.example/anime/one\nhttps://a.example/anime/two 2 4\n").unwrap();

        let cli = Cli::parse_from(["saturn-dl", "--batch-file", path.to_str().unwrap()]);
        let targets = collect_targets(&cli).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].start_episode, Some(2));
        assert_eq!(targets[1].end_episode, Some(4));
    }

    fn summary(interrupted: bool, error: Option<DownloadError>) -> BatchSummary {
        let mut report = SeriesReport::new("Frieren", "https://a.example/anime/frieren");
        if let Some(error) = error {
            report = report.with_error(&error);
        }
        BatchSummary {
            series: vec![report],
            interrupted,
        }
    }

    #[test]
    fn exit_codes_follow_the_summary() {
        assert_eq!(exit_code(&summary(false, None)), ExitCode::SUCCESS);
        assert_eq!(
            exit_code(&summary(false, Some(DownloadError::Network("reset".into())))),
            ExitCode::FAILURE
        );
        assert_eq!(
            exit_code(&summary(true, Some(DownloadError::Cancelled))),
            ExitCode::from(130)
        );
        assert_eq!(exit_code(&summary(true, None)), ExitCode::from(130));
    }

    #[test]
    fn missing_batch_file_is_reported() {
        let cli = Cli::parse_from(["saturn-dl", "--batch-file", "/nonexistent/URLs.txt"]);
        let err = collect_targets(&cli).unwrap_err();
        assert!(err.to_string().contains("Failed to read batch file"));
    }
}
