use std::path::PathBuf;
use std::time::Duration;

pub const DOWNLOAD_FOLDER: &str = "Downloads";
pub const BATCH_FILE: &str = "URLs.txt";

// Kept low so the site does not start rate limiting us
pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/117.0";

/// Settings shared by every component of a run.
///
/// Built once from the command line and handed to the orchestrator; nothing
/// reads configuration from globals.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub concurrency: usize,
    pub output_root: PathBuf,
    pub timeout: Duration,
    pub user_agent: String,
    pub show_progress: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            output_root: PathBuf::from(DOWNLOAD_FOLDER),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
            show_progress: true,
        }
    }
}

impl DownloaderConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}
