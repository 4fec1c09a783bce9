use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::MultiProgress;
use reqwest::Client;
use tracing::{debug, error, info, warn};

use crate::config::DownloaderConfig;
use crate::downloader::DownloadWorker;
use crate::error::DownloadError;
use crate::models::{
    BatchSummary, DownloadOutcome, EpisodeRef, EpisodeState, ResolvedMedia, SeriesReport, SeriesTarget,
    SourceKind,
};
use crate::progress::{ProgressSink, TerminalProgress, progress_display};
use crate::resolver::EpisodeSource;
use crate::shutdown::SharedShutdown;
use crate::utils::index_width;

/// Runs every series of a batch, one after the other, with a bounded number
/// of episode downloads in flight per series.
pub struct Orchestrator {
    source: Arc<dyn EpisodeSource>,
    worker: DownloadWorker,
    config: DownloaderConfig,
    shutdown: SharedShutdown,
    display: MultiProgress,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn EpisodeSource>,
        client: Client,
        config: DownloaderConfig,
        shutdown: SharedShutdown,
    ) -> Self {
        Self {
            source,
            worker: DownloadWorker::new(client, shutdown.clone()),
            display: progress_display(config.show_progress),
            config,
            shutdown,
        }
    }

    /// Draws into an existing display, e.g. the one the log writer suspends.
    pub fn with_display(mut self, display: MultiProgress) -> Self {
        self.display = display;
        self
    }

    pub async fn run(&self, targets: &[SeriesTarget]) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for target in targets {
            if self.shutdown.is_shutdown_requested() {
                warn!(url = %target.catalog_url, "interrupted, series not started");
                summary.series.push(
                    SeriesReport::new(&target.catalog_url, &target.catalog_url).with_error(&DownloadError::Cancelled),
                );
                continue;
            }
            summary.series.push(self.run_series(target).await);
        }

        summary.interrupted = self.shutdown.is_shutdown_requested();
        summary
    }

    pub async fn run_series(&self, target: &SeriesTarget) -> SeriesReport {
        let series = match self.source.series(target).await {
            Ok(series) => series,
            Err(err) => {
                error!(url = %target.catalog_url, error = %err, "skipping series");
                return SeriesReport::new(&target.catalog_url, &target.catalog_url).with_error(&err);
            }
        };

        let mut report = SeriesReport::new(&series.name, &target.catalog_url);
        if series.episodes.is_empty() {
            info!(series = %series.name, listed = series.total, "no episodes in the requested range");
            return report;
        }

        let dir = self.config.output_root.join(&series.name);
        if let Err(source) = tokio::fs::create_dir_all(&dir).await {
            let err = DownloadError::file_system(&dir, source);
            error!(series = %series.name, error = %err, "cannot create series directory");
            return report.with_error(&err);
        }

        let width = index_width(series.total);
        let progress = TerminalProgress::new(&self.display, &series.name, series.episodes.len());

        let mut outcomes: Vec<DownloadOutcome> = stream::iter(series.episodes)
            .map(|episode| self.process_episode(episode, &dir, width, &progress))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        progress.close();

        // Completion order is arbitrary
        outcomes.sort_by_key(|outcome| outcome.episode.index);
        report.outcomes = outcomes;

        info!(
            series = %report.series,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "series finished"
        );
        report
    }

    async fn process_episode(
        &self,
        episode: EpisodeRef,
        dir: &Path,
        width: usize,
        progress: &dyn ProgressSink,
    ) -> DownloadOutcome {
        let index = episode.index;
        let outcome = self.resolve_and_download(episode, dir, width, progress).await;
        progress.finish(index, outcome.is_success());
        outcome
    }

    async fn resolve_and_download(
        &self,
        episode: EpisodeRef,
        dir: &Path,
        width: usize,
        progress: &dyn ProgressSink,
    ) -> DownloadOutcome {
        transition(&episode, EpisodeState::Pending);
        // Nothing new is dispatched once Ctrl+C has been pressed
        if self.shutdown.is_shutdown_requested() {
            return DownloadOutcome::failed(episode, None, &DownloadError::Cancelled);
        }

        transition(&episode, EpisodeState::Resolving);
        let watch_url = match self.source.watch_page(&episode).await {
            Ok(url) => url,
            Err(err) => {
                transition(&episode, EpisodeState::ResolutionFailed);
                warn!(episode = episode.index, error = %err, "episode page unusable");
                return DownloadOutcome::resolution_failed(episode, &err);
            }
        };

        // Primary first; the mirror is tried when the primary link is missing
        // or its transfer fails on the network.
        let primary_failure = match self.source.primary(&episode, &watch_url).await {
            Ok(media) => {
                transition(&episode, EpisodeState::ResolvedPrimary);
                match self.download(&media, dir, width, progress).await {
                    Ok(outcome) => return outcome,
                    Err(err) if err.allows_fallback() => {
                        warn!(episode = episode.index, error = %err, "primary download failed, trying mirror");
                        PrimaryFailure::Download(err)
                    }
                    Err(err) => {
                        transition(&episode, EpisodeState::Failed);
                        return DownloadOutcome::failed(episode, Some(SourceKind::Primary), &err);
                    }
                }
            }
            Err(err) => {
                debug!(episode = episode.index, error = %err, "no primary source, trying mirror");
                PrimaryFailure::Resolution(err)
            }
        };

        let media = match self.source.alternate(&episode, &watch_url).await {
            Ok(media) => media,
            Err(err) => {
                warn!(episode = episode.index, error = %err, "mirror unusable");
                return match primary_failure {
                    PrimaryFailure::Resolution(primary) => {
                        transition(&episode, EpisodeState::ResolutionFailed);
                        let combined = DownloadError::ExtractionFailed(format!("{}; mirror: {}", primary, err));
                        DownloadOutcome::resolution_failed(episode, &combined)
                    }
                    PrimaryFailure::Download(primary) => {
                        transition(&episode, EpisodeState::Failed);
                        DownloadOutcome::failed(episode, Some(SourceKind::Primary), &primary)
                    }
                };
            }
        };

        transition(&episode, EpisodeState::ResolvedAlternate);
        match self.download(&media, dir, width, progress).await {
            Ok(outcome) => outcome,
            Err(err) => {
                transition(&episode, EpisodeState::Failed);
                DownloadOutcome::failed(episode, Some(SourceKind::Alternate), &err)
            }
        }
    }

    async fn download(
        &self,
        media: &ResolvedMedia,
        dir: &Path,
        width: usize,
        progress: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, DownloadError> {
        transition(&media.episode, EpisodeState::Downloading);
        let file = self.worker.download(media, dir, width, progress).await?;
        transition(&media.episode, EpisodeState::Success);
        info!(
            episode = media.episode.index,
            source = %media.source_kind,
            bytes = file.bytes,
            path = %file.path.display(),
            "episode saved"
        );
        Ok(DownloadOutcome::success(media, file.path, file.bytes))
    }
}

enum PrimaryFailure {
    Resolution(DownloadError),
    Download(DownloadError),
}

fn transition(episode: &EpisodeRef, state: EpisodeState) {
    debug!(
        series = %episode.series_name,
        episode = episode.index,
        terminal = state.is_terminal(),
        "{}",
        state
    );
}
