use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::DownloadError;

// One series to download, from the command line or a line of the batch file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesTarget {
    pub catalog_url: String,
    pub start_episode: Option<usize>,
    pub end_episode: Option<usize>,
}

impl SeriesTarget {
    pub fn new(catalog_url: impl Into<String>) -> Self {
        Self {
            catalog_url: catalog_url.into(),
            start_episode: None,
            end_episode: None,
        }
    }

    pub fn with_range(mut self, start: Option<usize>, end: Option<usize>) -> Self {
        self.start_episode = start;
        self.end_episode = end;
        self
    }
}

// An episode page discovered on a catalog page. `index` is 1-based and follows
// the on-page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeRef {
    pub series_name: String,
    pub index: usize,
    pub page_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    Primary,
    Alternate,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Alternate => write!(f, "alternate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub episode: EpisodeRef,
    pub direct_url: String,
    pub source_kind: SourceKind,
    /// Page the alternate host expects in the `Referer` header.
    pub referer: Option<String>,
    /// File name advertised by the host, used only for its extension.
    pub file_name_hint: Option<String>,
}

/// Lifecycle of a single episode inside the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    Pending,
    Resolving,
    ResolvedPrimary,
    ResolvedAlternate,
    ResolutionFailed,
    Downloading,
    Success,
    Failed,
}

impl EpisodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::ResolutionFailed)
    }
}

impl fmt::Display for EpisodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::ResolvedPrimary => "resolved (primary)",
            Self::ResolvedAlternate => "resolved (alternate)",
            Self::ResolutionFailed => "resolution failed",
            Self::Downloading => "downloading",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeStatus {
    Success,
    Failed,
    ResolutionFailed,
}

// Terminal record for one episode
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub episode: EpisodeRef,
    pub status: OutcomeStatus,
    pub bytes_written: u64,
    pub file_path: Option<PathBuf>,
    pub source_kind: Option<SourceKind>,
    pub error: Option<String>,
}

impl DownloadOutcome {
    pub fn success(media: &ResolvedMedia, file_path: PathBuf, bytes_written: u64) -> Self {
        Self {
            episode: media.episode.clone(),
            status: OutcomeStatus::Success,
            bytes_written,
            file_path: Some(file_path),
            source_kind: Some(media.source_kind),
            error: None,
        }
    }

    pub fn failed(episode: EpisodeRef, source_kind: Option<SourceKind>, error: &DownloadError) -> Self {
        Self {
            episode,
            status: OutcomeStatus::Failed,
            bytes_written: 0,
            file_path: None,
            source_kind,
            error: Some(error.to_string()),
        }
    }

    pub fn resolution_failed(episode: EpisodeRef, error: &DownloadError) -> Self {
        Self {
            episode,
            status: OutcomeStatus::ResolutionFailed,
            bytes_written: 0,
            file_path: None,
            source_kind: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesReport {
    pub series: String,
    pub catalog_url: String,
    /// Sorted by episode index.
    pub outcomes: Vec<DownloadOutcome>,
    pub error: Option<String>,
}

impl SeriesReport {
    pub fn new(series: impl Into<String>, catalog_url: impl Into<String>) -> Self {
        Self {
            series: series.into(),
            catalog_url: catalog_url.into(),
            outcomes: Vec::new(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: &DownloadError) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn failed_episodes(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.failed() == 0
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub series: Vec<SeriesReport>,
    pub interrupted: bool,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.series.iter().map(SeriesReport::succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.series.iter().map(SeriesReport::failed).sum()
    }

    pub fn is_success(&self) -> bool {
        !self.interrupted && self.series.iter().all(SeriesReport::is_success)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.series {
            match &report.error {
                Some(error) => writeln!(f, "{}: skipped ({})", report.series, error)?,
                None => writeln!(
                    f,
                    "{}: {} succeeded, {} failed",
                    report.series,
                    report.succeeded(),
                    report.failed()
                )?,
            }
            for outcome in report.failed_episodes() {
                writeln!(
                    f,
                    "  - episode {} ({}): {}",
                    outcome.episode.index,
                    outcome.episode.page_url,
                    outcome.error.as_deref().unwrap_or("unknown error")
                )?;
            }
        }
        write!(f, "Total: {} succeeded, {} failed", self.succeeded(), self.failed())?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}
