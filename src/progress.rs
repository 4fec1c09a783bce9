use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

/// The terminal area every series draws its bars into.
pub fn progress_display(visible: bool) -> MultiProgress {
    if visible {
        MultiProgress::new()
    } else {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }
}

/// Log writer for the tracing subscriber. Each line goes to stderr while the
/// bars are cleared, then the bars are redrawn below it.
#[derive(Clone)]
pub struct SuspendingWriter {
    display: MultiProgress,
}

impl SuspendingWriter {
    pub fn new(display: MultiProgress) -> Self {
        Self { display }
    }
}

impl Write for SuspendingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.display.suspend(|| io::stderr().write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for SuspendingWriter {
    type Writer = SuspendingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Receives byte-level progress from concurrent download workers.
///
/// `id` is the episode index, unique within a series. Implementations must be
/// safe to call from several workers at once.
pub trait ProgressSink: Send + Sync {
    /// A transfer has started; `total` is the advertised size, if any.
    fn start(&self, id: usize, label: &str, total: Option<u64>);

    fn update(&self, id: usize, bytes_delta: u64);

    /// The episode reached a terminal state.
    fn finish(&self, id: usize, success: bool);
}

/// Live terminal display: one overall bar per series plus one bar per
/// in-flight episode.
pub struct TerminalProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    downloaded: AtomicU64,
    failed: AtomicU64,
}

impl TerminalProgress {
    pub fn new(display: &MultiProgress, series_name: &str, episodes: usize) -> Self {
        let multi = display.clone();
        let overall = multi.add(ProgressBar::new(episodes as u64));
        overall.set_style(
            ProgressStyle::with_template("{msg:.bold} [{bar:30.green/white}] {pos}/{len} episodes ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        overall.set_message(series_name.to_string());

        Self {
            multi,
            overall,
            bars: Mutex::new(HashMap::new()),
            downloaded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    // Stops the overall bar; per-episode bars are already gone by now
    pub fn close(&self) {
        let downloaded = HumanBytes(self.downloaded_bytes());
        let failed = self.failed();
        if failed > 0 {
            self.overall
                .abandon_with_message(format!("{} ({}, {} failed)", self.overall.message(), downloaded, failed));
        } else {
            self.overall
                .finish_with_message(format!("{} ({})", self.overall.message(), downloaded));
        }
    }

    fn bars(&self) -> std::sync::MutexGuard<'_, HashMap<usize, ProgressBar>> {
        self.bars.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn bytes_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{msg:>10} {spinner} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} • {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:>10} {spinner} {bytes} {bytes_per_sec}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl ProgressSink for TerminalProgress {
    fn start(&self, id: usize, label: &str, total: Option<u64>) {
        let bar = match total {
            Some(total) => ProgressBar::new(total).with_style(bytes_style()),
            None => ProgressBar::new_spinner().with_style(spinner_style()),
        };
        let bar = self.multi.add(bar);
        bar.set_message(label.to_string());

        // A fallback download replaces the bar of the failed attempt
        if let Some(previous) = self.bars().insert(id, bar) {
            previous.finish_and_clear();
            self.multi.remove(&previous);
        }
    }

    fn update(&self, id: usize, bytes_delta: u64) {
        self.downloaded.fetch_add(bytes_delta, Ordering::Relaxed);
        if let Some(bar) = self.bars().get(&id) {
            bar.inc(bytes_delta);
        }
    }

    fn finish(&self, id: usize, success: bool) {
        if let Some(bar) = self.bars().remove(&id) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.overall.inc(1);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Sink that only records what it was told.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub started: Mutex<Vec<(usize, Option<u64>)>>,
        pub bytes: AtomicU64,
    }

    impl ProgressSink for RecordingSink {
        fn start(&self, id: usize, _label: &str, total: Option<u64>) {
            self.started.lock().unwrap().push((id, total));
        }

        fn update(&self, _id: usize, bytes_delta: u64) {
            self.bytes.fetch_add(bytes_delta, Ordering::SeqCst);
        }

        fn finish(&self, _id: usize, _success: bool) {}
    }

    #[test]
    fn counts_bytes_and_episodes() {
        let progress = TerminalProgress::new(&progress_display(false), "Frieren", 3);
        progress.start(1, "Ep01", Some(100));
        progress.start(2, "Ep02", None);
        progress.update(1, 60);
        progress.update(2, 10);
        progress.update(1, 40);
        progress.finish(1, true);
        progress.finish(2, false);

        assert_eq!(progress.downloaded_bytes(), 110);
        assert_eq!(progress.overall.position(), 2);
        assert_eq!(progress.failed(), 1);
        assert!(progress.bars().is_empty());
        progress.close();
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let progress = std::sync::Arc::new(TerminalProgress::new(&progress_display(false), "Frieren", 8));
        let handles: Vec<_> = (1..=8)
            .map(|id| {
                let progress = progress.clone();
                std::thread::spawn(move || {
                    progress.start(id, "ep", Some(1000));
                    for _ in 0..100 {
                        progress.update(id, 10);
                    }
                    progress.finish(id, true);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(progress.downloaded_bytes(), 8 * 1000);
        assert_eq!(progress.overall.position(), 8);
    }

    #[test]
    fn restarting_an_episode_replaces_its_bar() {
        let progress = TerminalProgress::new(&progress_display(false), "Frieren", 1);
        progress.start(1, "Ep01", Some(10));
        progress.start(1, "Ep01", Some(20));
        assert_eq!(progress.bars().len(), 1);
        assert_eq!(progress.bars().get(&1).and_then(|b| b.length()), Some(20));
    }

    #[test]
    fn log_writer_passes_whole_lines_through() {
        let display = progress_display(false);
        let bar = display.add(ProgressBar::new(10));
        bar.inc(3);

        let mut writer = SuspendingWriter::new(display.clone()).make_writer();
        let line = b"WARN saturn_dl: primary download failed\n";
        assert_eq!(writer.write(line).unwrap(), line.len());
        writer.flush().unwrap();
        assert_eq!(bar.position(), 3);
    }
}
