use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{DownloadError, Result};
use crate::models::SeriesTarget;

// Markers the site appends to titles of subbed releases
const TITLE_SUFFIXES: [&str; 2] = ["Sub ITA", "ITA"];

// Slugs of subbed releases end in "-a", "-aa", ...
static SLUG_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-a+$").expect("slug suffix pattern is valid"));

// Turns a page title into a name usable as a directory and file prefix.
//
// - drops a trailing "Sub ITA"/"ITA" marker
// - removes characters that are not allowed in file names
// - collapses runs of whitespace
pub fn normalize_series_name(title: &str) -> String {
    let mut name = title.trim();
    for suffix in TITLE_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped;
            break;
        }
    }

    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .trim_end()
        .to_string()
}

// Last path segment of a catalog URL, minus the "-a..a" release suffix
pub fn slug_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let slug = SLUG_SUFFIX.replace(segment, "").to_string();
    (!slug.is_empty()).then_some(slug)
}

// Digits used for episode numbers: at least two, more for long series
pub fn index_width(total_episodes: usize) -> usize {
    total_episodes.max(1).to_string().len().max(2)
}

pub fn episode_file_name(series_name: &str, index: usize, width: usize, extension: &str) -> String {
    format!("{} - Ep{:0width$}.{}", series_name, index, extension, width = width)
}

// Picks the output extension from the media URL, then the host's file name, then mp4
pub fn media_extension(direct_url: &str, file_name_hint: Option<&str>) -> String {
    let from_url = Url::parse(direct_url).ok().and_then(|url| {
        url.path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
    });

    from_url
        .as_deref()
        .and_then(extension_of)
        .or_else(|| file_name_hint.and_then(extension_of))
        .unwrap_or_else(|| "mp4".to_string())
}

fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    let valid = !stem.is_empty()
        && (2..=4).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

// Parses the batch file: one catalog URL per line, optionally followed by a
// start and end episode. Blank lines and `#` comments are skipped.
pub fn parse_batch_file(contents: &str) -> Result<Vec<SeriesTarget>> {
    let mut targets = Vec::new();

    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let Some(url) = fields.next() else { continue };
        let start = parse_episode_field(fields.next(), line_no + 1)?;
        let end = parse_episode_field(fields.next(), line_no + 1)?;
        if fields.next().is_some() {
            return Err(DownloadError::InvalidInput(format!(
                "line {}: expected `<url> [start] [end]`",
                line_no + 1
            )));
        }

        targets.push(SeriesTarget::new(url).with_range(start, end));
    }

    Ok(targets)
}

fn parse_episode_field(field: Option<&str>, line_no: usize) -> Result<Option<usize>> {
    let Some(field) = field else { return Ok(None) };
    match field.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(Some(n)),
        _ => Err(DownloadError::InvalidInput(format!(
            "line {}: `{}` is not an episode number",
            line_no, field
        ))),
    }
}

// Formats elapsed seconds for the end-of-run summary
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
