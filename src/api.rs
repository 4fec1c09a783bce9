use reqwest::{Client, RequestBuilder};
use reqwest::header::REFERER;
use tracing::debug;

use crate::config::DownloaderConfig;
use crate::error::Result;

// Builds the HTTP client shared by page fetches and downloads.
// No total timeout: episodes can take minutes, so only connect and idle reads are bounded.
pub fn build_client(config: &DownloaderConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(config.timeout)
        .read_timeout(config.timeout)
        .build()?;

    Ok(client)
}

// Fetches a page as text, failing on any non-2xx status
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    debug!(url, "fetching page");
    read_page(client.get(url)).await
}

// Same, for pages that are only served when linked from `referer`
pub async fn fetch_text_from(client: &Client, url: &str, referer: &str) -> Result<String> {
    debug!(url, referer, "fetching page");
    read_page(client.get(url).header(REFERER, referer)).await
}

async fn read_page(request: RequestBuilder) -> Result<String> {
    let html = request
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    Ok(html)
}
