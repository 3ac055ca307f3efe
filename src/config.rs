use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Per-store scrape rules from `stores.json`: the catalog sections to walk
/// and the paginated view URL templates to expand for each of them.
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub sections: Vec<String>,
    #[serde(default)]
    pub views: BTreeMap<String, ViewConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ViewConfig {
    pub url: String,
    pub page_count: u32,
}

pub type StoresConfig = BTreeMap<String, StoreConfig>;

pub fn load(path: &Path) -> Result<StoresConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read store config {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid store config {}", path.display()))
}

/// Expand a view URL template for one section/page.
pub fn expand_url(template: &str, section: &str, page: u32) -> String {
    template
        .replace("${section}", section)
        .replace("${page}", &page.to_string())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_template_placeholders() {
        let url = expand_url(
            "https://www.juno.co.uk/${section}/eight-weeks/${page}?order=date_down",
            "deep-house",
            3,
        );
        assert_eq!(
            url,
            "https://www.juno.co.uk/deep-house/eight-weeks/3?order=date_down"
        );
    }

    #[test]
    fn parses_store_config() {
        let raw = r#"{
            "juno": {
                "sections": ["deep-house"],
                "views": {
                    "weekly_chart": {
                        "url": "https://example.test/${section}/chart/${page}",
                        "page_count": 5
                    }
                }
            },
            "redeye": { "sections": ["techno-electro"] }
        }"#;
        let cfg: StoresConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg["juno"].views["weekly_chart"].page_count, 5);
        assert!(cfg["redeye"].views.is_empty());
        assert_eq!(cfg["redeye"].sections, ["techno-electro"]);
    }
}
