use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::api::{fetch_text, fetch_text_from};
use crate::document::{Document, HtmlDocument};
use crate::error::{DownloadError, Result};
use crate::extractor::extract_link;
use crate::models::{EpisodeRef, ResolvedMedia, SeriesTarget, SourceKind};
use crate::resolver::{EpisodeSource, ResolvedSeries, parse_catalog, resolve_range};

const WATCH_LINK_SELECTOR: &str = r#"a[href*="watch?file="]"#;
const MP4_SOURCE_SELECTOR: &str = r#"source[type="video/mp4"][src]"#;
const MIRROR_LINK_SELECTOR: &str = r#"a[target="_blank"][href]"#;

/// Scraper for AnimeSaturn-style catalog and episode pages.
pub struct SaturnSite {
    client: Client,
}

impl SaturnSite {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EpisodeSource for SaturnSite {
    async fn series(&self, target: &SeriesTarget) -> Result<ResolvedSeries> {
        let catalog_url = Url::parse(target.catalog_url.trim())
            .map_err(|e| DownloadError::series_not_found(&target.catalog_url, format!("invalid url: {}", e)))?;

        info!(url = %catalog_url, "fetching catalog page");
        let html = fetch_text(&self.client, catalog_url.as_str()).await?;
        let catalog = parse_catalog(&HtmlDocument::parse(&html), &catalog_url)?;

        let series = resolve_range(catalog, target.start_episode, target.end_episode);
        info!(
            series = %series.name,
            listed = series.total,
            selected = series.episodes.len(),
            "catalog resolved"
        );
        Ok(series)
    }

    async fn watch_page(&self, episode: &EpisodeRef) -> Result<String> {
        let page_url = parse_url(&episode.page_url)?;
        let html = fetch_text(&self.client, page_url.as_str()).await?;
        find_watch_link(&html, &page_url)?
            .ok_or_else(|| DownloadError::ExtractionFailed(format!("no watch link on {}", episode.page_url)))
    }

    async fn primary(&self, episode: &EpisodeRef, watch_url: &str) -> Result<ResolvedMedia> {
        let html = fetch_text(&self.client, watch_url).await?;
        let direct_url = find_primary_source(&html, &parse_url(watch_url)?)?
            .ok_or_else(|| DownloadError::ExtractionFailed(format!("no mp4 source on {}", watch_url)))?;

        debug!(episode = episode.index, %direct_url, "primary source found");
        Ok(ResolvedMedia {
            episode: episode.clone(),
            direct_url,
            source_kind: SourceKind::Primary,
            referer: None,
            file_name_hint: None,
        })
    }

    async fn alternate(&self, episode: &EpisodeRef, watch_url: &str) -> Result<ResolvedMedia> {
        let mirror_url = mirror_page_url(watch_url)?;
        let html = fetch_text(&self.client, mirror_url.as_str()).await?;
        let embed_url = find_embed_link(&html, &mirror_url)?
            .ok_or_else(|| DownloadError::ExtractionFailed(format!("no mirror link on {}", mirror_url)))?;

        debug!(episode = episode.index, %embed_url, "fetching embed page");
        let embed_html = fetch_text_from(&self.client, &embed_url, mirror_url.as_str()).await?;
        let link = extract_link(&embed_html)?;

        Ok(ResolvedMedia {
            episode: episode.clone(),
            direct_url: link.url,
            source_kind: SourceKind::Alternate,
            referer: Some(embed_url),
            file_name_hint: link.title,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| DownloadError::InvalidInput(format!("bad url {}: {}", raw, e)))
}

// The watch page with the mirror selector switched on
fn mirror_page_url(watch_url: &str) -> Result<Url> {
    let mut url = parse_url(watch_url)?;
    url.query_pairs_mut().append_pair("server", "1");
    Ok(url)
}

fn first_link(html: &str, base: &Url, selector: &str, attr: &str) -> Result<Option<String>> {
    let doc = HtmlDocument::parse(html);
    let link = doc
        .first_attr(selector, attr)?
        .and_then(|href| base.join(href.trim()).ok())
        .map(|url| url.to_string());
    Ok(link)
}

pub fn find_watch_link(html: &str, base: &Url) -> Result<Option<String>> {
    first_link(html, base, WATCH_LINK_SELECTOR, "href")
}

pub fn find_primary_source(html: &str, base: &Url) -> Result<Option<String>> {
    first_link(html, base, MP4_SOURCE_SELECTOR, "src")
}

pub fn find_embed_link(html: &str, base: &Url) -> Result<Option<String>> {
    first_link(html, base, MIRROR_LINK_SELECTOR, "href")
}
