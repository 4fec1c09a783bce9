use std::ops::RangeInclusive;

use async_trait::async_trait;
use url::Url;

use crate::document::Document;
use crate::error::{DownloadError, Result};
use crate::models::{EpisodeRef, ResolvedMedia, SeriesTarget};
use crate::utils::{normalize_series_name, slug_from_url};

// Catalog page layout
const TITLE_SELECTOR: &str = "div.anime-title-as b";
const EPISODE_LINK_SELECTOR: &str = r#"a.bottone-ep[target="_blank"][href]"#;

/// What a catalog page says about a series, before any range is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub series_name: String,
    pub episode_urls: Vec<String>,
}

/// A series with its episodes narrowed to the requested range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSeries {
    pub name: String,
    /// Episodes listed on the catalog page, before filtering.
    pub total: usize,
    pub episodes: Vec<EpisodeRef>,
}

/// The site as seen by the orchestrator.
///
/// Everything that depends on the site's markup sits behind this trait, so a
/// layout change only touches its implementation.
#[async_trait]
pub trait EpisodeSource: Send + Sync {
    /// Fetches the catalog page and returns the episodes in the target's range.
    async fn series(&self, target: &SeriesTarget) -> Result<ResolvedSeries>;

    /// Finds the watch page linked from an episode page.
    async fn watch_page(&self, episode: &EpisodeRef) -> Result<String>;

    /// Direct link hosted by the site itself.
    async fn primary(&self, episode: &EpisodeRef, watch_url: &str) -> Result<ResolvedMedia>;

    /// Direct link rebuilt from the third-party mirror.
    async fn alternate(&self, episode: &EpisodeRef, watch_url: &str) -> Result<ResolvedMedia>;
}

// Reads the series title and the episode links, in page order
pub fn parse_catalog(doc: &dyn Document, catalog_url: &Url) -> Result<Catalog> {
    let not_found = |reason: &str| DownloadError::series_not_found(catalog_url.as_str(), reason);

    let title = doc
        .first_text(TITLE_SELECTOR)?
        .ok_or_else(|| not_found("series title not found"))?;

    let mut series_name = normalize_series_name(&title);
    if series_name.is_empty() {
        series_name = slug_from_url(catalog_url)
            .map(|slug| normalize_series_name(&slug))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| not_found("series title is empty"))?;
    }

    // A link that does not resolve keeps its slot so later episodes are not
    // renumbered; fetching it fails that episode alone.
    let episode_urls: Vec<String> = doc
        .find_all(EPISODE_LINK_SELECTOR)?
        .iter()
        .filter_map(|node| node.attr("href"))
        .map(|href| {
            let href = href.trim();
            catalog_url
                .join(href)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| href.to_string())
        })
        .collect();

    if episode_urls.is_empty() {
        return Err(not_found("no episode links on the page"));
    }

    Ok(Catalog {
        series_name,
        episode_urls,
    })
}

// 1-based inclusive range of episodes to keep, or None when nothing matches.
// A missing start means the first episode, a missing end the last; an end past
// the last episode is clamped.
pub fn episode_range(count: usize, start: Option<usize>, end: Option<usize>) -> Option<RangeInclusive<usize>> {
    let start = start.unwrap_or(1).max(1);
    let end = end.unwrap_or(count).min(count);

    (start <= end).then_some(start..=end)
}

pub fn resolve_range(catalog: Catalog, start: Option<usize>, end: Option<usize>) -> ResolvedSeries {
    let total = catalog.episode_urls.len();
    let range = episode_range(total, start, end);

    let episodes = catalog
        .episode_urls
        .into_iter()
        .enumerate()
        .map(|(i, page_url)| EpisodeRef {
            series_name: catalog.series_name.clone(),
            index: i + 1,
            page_url,
        })
        .filter(|episode| range.as_ref().is_some_and(|r| r.contains(&episode.index)))
        .collect();

    ResolvedSeries {
        name: catalog.series_name,
        total,
        episodes,
    }
}
