use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Client;
use reqwest::header::REFERER;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{DownloadError, Result};
use crate::models::{ResolvedMedia, SourceKind};
use crate::progress::ProgressSink;
use crate::shutdown::SharedShutdown;
use crate::utils::{episode_file_name, media_extension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Streams resolved media to disk.
///
/// Data goes to `<file>.part` first and is renamed once the body is complete,
/// so an interrupted or failed transfer never leaves a file that looks done.
#[derive(Clone)]
pub struct DownloadWorker {
    client: Client,
    shutdown: SharedShutdown,
}

impl DownloadWorker {
    pub fn new(client: Client, shutdown: SharedShutdown) -> Self {
        Self { client, shutdown }
    }

    pub fn target_path(media: &ResolvedMedia, dest_dir: &Path, width: usize) -> PathBuf {
        let extension = media_extension(&media.direct_url, media.file_name_hint.as_deref());
        dest_dir.join(episode_file_name(
            &media.episode.series_name,
            media.episode.index,
            width,
            &extension,
        ))
    }

    pub async fn download(
        &self,
        media: &ResolvedMedia,
        dest_dir: &Path,
        width: usize,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadedFile> {
        let path = Self::target_path(media, dest_dir, width);
        let mut part_name = path.clone().into_os_string();
        part_name.push(".part");
        let part = PathBuf::from(part_name);

        debug!(
            episode = media.episode.index,
            source = %media.source_kind,
            path = %path.display(),
            "starting download"
        );

        let label = format!("Ep{:0width$}", media.episode.index, width = width);
        let bytes = match self.stream_to(media, &part, &label, sink).await {
            Ok(bytes) => bytes,
            Err(err) => {
                discard(&part).await;
                return Err(err);
            }
        };

        if let Err(source) = fs::rename(&part, &path).await {
            discard(&part).await;
            return Err(DownloadError::file_system(&path, source));
        }

        Ok(DownloadedFile { path, bytes })
    }

    async fn stream_to(
        &self,
        media: &ResolvedMedia,
        part: &Path,
        label: &str,
        sink: &dyn ProgressSink,
    ) -> Result<u64> {
        if self.shutdown.is_shutdown_requested() {
            return Err(DownloadError::Cancelled);
        }

        let mut request = self.client.get(&media.direct_url);
        // Mirrors refuse requests that do not come from their own player page
        if media.source_kind == SourceKind::Alternate {
            if let Some(referer) = &media.referer {
                request = request.header(REFERER, referer);
            }
        }

        let response = request.send().await?.error_for_status()?;
        let expected = response.content_length();
        sink.start(media.episode.index, label, expected);

        let mut file = File::create(part)
            .await
            .map_err(|e| DownloadError::file_system(part, e))?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.wait_for_shutdown() => return Err(DownloadError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::file_system(part, e))?;
            written += chunk.len() as u64;
            sink.update(media.episode.index, chunk.len() as u64);
        }

        file.flush().await.map_err(|e| DownloadError::file_system(part, e))?;

        if let Some(expected) = expected {
            if written < expected {
                return Err(DownloadError::Network(format!(
                    "connection closed after {} of {} bytes",
                    written, expected
                )));
            }
        }

        Ok(written)
    }
}

async fn discard(part: &Path) {
    if let Err(err) = fs::remove_file(part).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %part.display(), error = %err, "could not remove partial file");
        }
    }
}
