use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::ScrapeOptions;
use crate::config::{self, StoreConfig};
use crate::fetch;
use crate::markup::{self, Direction};
use crate::registry::Registry;

const BASE_URL: &str = "https://www.juno.co.uk";
const CHART_VIEWS: &[&str] = &["weekly_chart", "monthly_chart"];

/// Walk every configured section × view × page and merge parsed releases
/// into the registry. Pages are fetched one at a time; a failed fetch skips
/// that page and the walk continues.
pub async fn scrape(
    client: &Client,
    cfg: &StoreConfig,
    registry: &mut Registry,
    opts: &ScrapeOptions,
) -> Result<()> {
    if cfg.views.is_empty() {
        bail!("\"views\" missing from juno store config");
    }
    registry.clear_fields(&position_fields(cfg));

    let pages_per_section: u64 = cfg
        .views
        .values()
        .map(|v| u64::from(opts.pages.unwrap_or(v.page_count).saturating_sub(1)))
        .sum();
    let pb = ProgressBar::new(cfg.sections.len() as u64 * pages_per_section);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for section in &cfg.sections {
        for (view_name, view) in &cfg.views {
            info!("scraping: {} / {}", section, view_name);
            let page_count = opts.pages.unwrap_or(view.page_count);
            let mut counter: i64 = 0;
            for page in 1..page_count {
                let url = config::expand_url(&view.url, section, page);
                match fetch::fetch_page(client, &url).await {
                    Ok(html) => {
                        counter = scrape_page(&html, view_name, section, counter, registry);
                    }
                    Err(e) => warn!("skipping {}: {:#}", url, e),
                }
                pb.inc(1);
                if opts.test_single {
                    break;
                }
            }
        }
    }

    pb.finish_and_clear();
    Ok(())
}

/// Position fields are store+view+section qualified so one release can rank
/// in several sections at once. All of them are re-derived each run.
fn position_fields(cfg: &StoreConfig) -> Vec<String> {
    let mut fields = Vec::new();
    for section in &cfg.sections {
        for view in cfg.views.keys() {
            fields.push(format!("juno-{view}_{section}"));
        }
    }
    fields
}

/// Slice one listing page into release blocks and merge each parsed release.
/// Returns the advanced new-release counter.
fn scrape_page(
    html: &str,
    category: &str,
    section: &str,
    counter: i64,
    registry: &mut Registry,
) -> i64 {
    let products = markup::collect_blocks(html, "class=\"product-list\"", "div");
    let Some(product_list) = products.first() else {
        warn!("no product list found for {} / {}", section, category);
        return counter;
    };

    let mut counter = counter;
    for release in markup::collect_blocks(product_list.text, "class=\"dv-item\"", "div") {
        match parse_release(release.text, category, section, counter) {
            Some((key, record)) => {
                registry.merge_release(&key, record);
                counter += 1;
            }
            None => warn!("failed to parse a release block, markup may have shifted"),
        }
    }
    counter
}

fn parse_release(
    block: &str,
    category: &str,
    section: &str,
    counter: i64,
) -> Option<(String, Value)> {
    let (_, id_elem) = markup::find_element(block, "<div id=", ">", 0, Direction::Forward)?;
    let (_, link_elem) = markup::find_element(block, "<a href=", ">", 0, Direction::Forward)?;
    let (_, artwork_elem) = markup::find_element(block, "<img class", ">", 0, Direction::Forward)?;

    let (offset, artist_elem) =
        markup::find_element(block, "<a class=\"text-md\"", "</a>", 0, Direction::Forward)?;
    let (offset, title_elem) =
        markup::find_element(block, "<a class=\"text-md\"", "</a>", offset, Direction::Forward)?;
    let (offset, label_elem) =
        markup::find_element(block, "<a class=\"text-md\"", "</a>", offset, Direction::Forward)?;
    let (_, cat_elem) =
        markup::find_element(block, "<div class=\"vi-text", "<br class", offset, Direction::Forward)?;

    let mut store_tags = Map::new();
    let pos = if CHART_VIEWS.contains(&category) {
        // chart positions are listed in the markup
        store_tags.insert("has_charted".into(), json!(true));
        markup::nested_body(block, 4)?.trim().parse::<i64>().ok()?
    } else {
        // latest-release positions are tracked by the walk counter
        counter
    };

    if block.contains(">out of stock<") {
        store_tags.insert("out_of_stock".into(), json!(true));
        store_tags.insert("has_sold_out".into(), json!(true));
    } else {
        store_tags.insert("out_of_stock".into(), json!(false));
    }

    let id = parse_id(id_elem)?;
    let (track_names, track_urls) =
        parse_tracks(&markup::collect_blocks(block, "class=\"listing-track", "div"));

    let mut record = Map::new();
    record.insert("store".into(), json!("juno"));
    record.insert("id".into(), json!(id));
    record.insert("link".into(), json!(parse_link(link_elem)?));
    record.insert("artist".into(), json!(markup::tag_body(artist_elem)?));
    record.insert("title".into(), json!(markup::tag_body(title_elem)?));
    record.insert("label".into(), json!(parse_label(label_elem)?));
    record.insert("cat".into(), json!(parse_cat(cat_elem)?));
    record.insert("artworks".into(), json!(parse_artworks(artwork_elem)?));
    record.insert("store_tags".into(), Value::Object(store_tags));
    record.insert("track_names".into(), json!(track_names));
    record.insert("track_urls".into(), json!(track_urls));
    record.insert(format!("juno-{category}_{section}"), json!(pos));

    // genre tags sit loose on the record so they can be queried directly
    for span in markup::collect_blocks(block, "class=\"juno-tags-tag\"", "span") {
        if let Some(tag) = markup::nested_body(span.text, 2) {
            let tag = tag.trim();
            if !tag.is_empty() {
                record.insert(tag.to_string(), json!("genre_tag"));
            }
        }
    }

    Some((format!("juno-{id}"), Value::Object(record)))
}

/// `<div id="item-861163-1" ...>` → `861163-1`.
fn parse_id(id_elem: &str) -> Option<String> {
    let raw = markup::attribute_value(id_elem, "id")?;
    Some(raw.strip_prefix("item-").unwrap_or(raw).to_string())
}

/// Product links are site-relative.
fn parse_link(link_elem: &str) -> Option<String> {
    let href = markup::attribute_value(link_elem, "href")?;
    Some(format!("{BASE_URL}{href}"))
}

/// The label element's body is the text after its last `>`.
fn parse_label(label_elem: &str) -> Option<String> {
    let start = label_elem.rfind('>')?;
    Some(label_elem[start + 1..].to_string())
}

/// Catalogue number from `Cat: UFOS 004. Rel:&nbsp;28 Mar 22`. An inverted
/// span (shifted markup) is absence, not a panic.
fn parse_cat(cat_elem: &str) -> Option<String> {
    let info = markup::tag_body(cat_elem)?;
    let end = info.rfind('.')?;
    let start = info.rfind("Cat:")? + "Cat:".len();
    Some(info.get(start..end)?.trim().to_string())
}

/// Three artwork sizes derived from the canonical small image URL. Lazy
/// images carry a `data:image` placeholder in `src` and the real URL in
/// `data-src`.
fn parse_artworks(artwork_elem: &str) -> Option<Vec<String>> {
    let mut small = markup::attribute_value(artwork_elem, "src")?;
    if small.contains("data:image") {
        small = markup::attribute_value(artwork_elem, "data-src")?;
    }
    let medium = small.replace("/150/", "/300/").replace(".jpg", "-MED.jpg");
    let large = small.replace("/150/", "/full/").replace(".jpg", "-BIG.jpg");
    Some(vec![small.to_string(), medium, large])
}

/// Track names and snippet URLs from the listing-track blocks. Names sit
/// one nesting level deeper when the play button is present.
fn parse_tracks(tracks: &[markup::Block]) -> (Vec<String>, Vec<String>) {
    let mut names = Vec::new();
    let mut urls = Vec::new();
    for track in tracks {
        let url = markup::attribute_value(track.text, "href");
        let depth = if url.is_some() { 6 } else { 4 };
        if let Some(url) = url {
            urls.push(url.to_string());
        }
        match markup::nested_body(track.text, depth) {
            Some(name) if !name.is_empty() => names.push(name.to_string()),
            _ => warn!("track name missing at expected depth, markup may have shifted"),
        }
    }
    (names, urls)
}

// ── Tests ──
