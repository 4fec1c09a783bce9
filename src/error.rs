use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong between a catalog URL and a file on disk.
///
/// Errors are caught at the episode or series boundary and turned into a
/// recorded outcome, so none of these ever aborts a whole batch.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("series not found at {url}: {reason}")]
    SeriesNotFound { url: String, reason: String },

    #[error("link extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("filesystem error at {}: {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download cancelled")]
    Cancelled,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl DownloadError {
    pub fn series_not_found(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SeriesNotFound {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    // Only transport failures are worth retrying against the alternate host
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        match err.url() {
            Some(url) => Self::Network(format!("{} ({})", err, url)),
            None => Self::Network(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_allow_fallback() {
        assert!(DownloadError::Network("reset".into()).allows_fallback());
        assert!(!DownloadError::Cancelled.allows_fallback());
        assert!(!DownloadError::ExtractionFailed("x".into()).allows_fallback());
        let fs = DownloadError::file_system(
            "Downloads/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!fs.allows_fallback());
    }

    #[test]
    fn messages_name_the_failing_thing() {
        let err = DownloadError::series_not_found("https://example.org/anime/x", "no title");
        assert_eq!(
            err.to_string(),
            "series not found at https://example.org/anime/x: no title"
        );
    }
}
