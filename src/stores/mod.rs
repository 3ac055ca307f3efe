pub mod juno;
pub mod redeye;

/// Options shared by every store scraper.
pub struct ScrapeOptions {
    /// Override for the per-view configured page count.
    pub pages: Option<u32>,
    /// Stop after the first page of each scrape category.
    pub test_single: bool,
    /// Probe snippet/artwork asset URLs (slow, one request per asset).
    pub probe_assets: bool,
}
