use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

/// Fetch one page and return its body text. Pages are fetched strictly one
/// at a time; a failure here is the caller's cue to skip the page and move
/// on.
pub async fn fetch_page(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request failed: {url}"))?
        .error_for_status()
        .with_context(|| format!("bad status: {url}"))?;
    response
        .text()
        .await
        .with_context(|| format!("failed to read body: {url}"))
}

/// Whether a probed asset URL exists (numbered snippet/artwork checks).
/// Any transport error counts as a miss.
pub async fn probe_exists(client: &Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            debug!("probe failed for {}: {}", url, e);
            false
        }
    }
}
