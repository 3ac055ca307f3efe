use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::ScrapeOptions;
use crate::config::StoreConfig;
use crate::fetch;
use crate::markup::{self, Direction};
use crate::registry::Registry;

const BASE_URL: &str = "https://www.redeyerecords.co.uk";
const SNIPPET_CDN: &str = "https://redeye-391831.c.cdn77.org";
const IMAGERY_BASE: &str = "https://www.redeyerecords.co.uk/imagery";
const DEFAULT_PAGE_COUNT: u32 = 100;
const POSITION_FIELDS: &[&str] = &["weekly_chart", "monthly_chart", "new_releases"];

struct PageUrl {
    url: String,
    category: &'static str,
    /// Genre tags derived from the section name (`techno-electro` → techno,
    /// electro), stored truthy on each release so they can be queried.
    tags: Vec<String>,
}

/// Walk the chart and new-release pages for every configured section. The
/// new-release counter runs across the whole walk, charts take their listed
/// index per page.
pub async fn scrape(
    client: &Client,
    cfg: &StoreConfig,
    registry: &mut Registry,
    opts: &ScrapeOptions,
) -> Result<()> {
    let fields: Vec<String> = POSITION_FIELDS.iter().map(|f| f.to_string()).collect();
    registry.clear_fields(&fields);

    let page_count = opts.pages.unwrap_or(DEFAULT_PAGE_COUNT);
    let pages = build_page_urls(&cfg.sections, page_count);

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut new_releases: i64 = 0;
    for page in &pages {
        info!("scraping page: {}", page.url);
        let html = match fetch::fetch_page(client, &page.url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("skipping {}: {:#}", page.url, e);
                pb.inc(1);
                continue;
            }
        };

        let grids = markup::collect_blocks(&html, "class=\"releaseGrid", "div");
        for (index, grid) in grids.iter().enumerate() {
            let Some((key, mut record)) = parse_release(grid.text, &page.tags) else {
                warn!("failed to parse a release block, markup may have shifted");
                continue;
            };

            if page.category == "new_releases" {
                record.insert("new_releases".into(), json!(new_releases));
                new_releases += 1;
            } else {
                record.insert(page.category.to_string(), json!(index));
                if let Some(Value::Object(tags)) = record.get_mut("store_tags") {
                    tags.insert("has_charted".into(), json!(true));
                }
            }

            if opts.probe_assets {
                probe_release_assets(client, registry, &key, &mut record).await;
            }

            registry.merge_release(&key, Value::Object(record));
            reconcile_tracks(registry, &key);
        }

        pb.inc(1);
        if opts.test_single {
            break;
        }
    }

    pb.finish_and_clear();
    Ok(())
}

/// Chart pages are single, new releases paginate with an unnumbered first
/// page and `page-N` from 2 on.
fn build_page_urls(sections: &[String], page_count: u32) -> Vec<PageUrl> {
    let mut pages = Vec::new();
    for section in sections {
        let tags: Vec<String> = section.split('-').map(str::to_string).collect();
        pages.push(PageUrl {
            url: format!("{BASE_URL}/{section}/weekly-chart"),
            category: "weekly_chart",
            tags: tags.clone(),
        });
        pages.push(PageUrl {
            url: format!("{BASE_URL}/{section}/monthly-chart"),
            category: "monthly_chart",
            tags: tags.clone(),
        });
        pages.push(PageUrl {
            url: format!("{BASE_URL}/{section}/new-releases/"),
            category: "new_releases",
            tags: tags.clone(),
        });
        for page in 2..page_count {
            pages.push(PageUrl {
                url: format!("{BASE_URL}/{section}/new-releases/page-{page}"),
                category: "new_releases",
                tags: tags.clone(),
            });
        }
    }
    pages
}

fn parse_release(block: &str, tags: &[String]) -> Option<(String, Map<String, Value>)> {
    let (_, id_elem) = markup::find_element(block, "<div id=", ">", 0, Direction::Forward)?;
    let (_, artist_elem) =
        markup::find_element(block, "<p class=\"artist\"", "</p>", 0, Direction::Forward)?;
    let (_, tracks_elem) =
        markup::find_element(block, "<p class=\"tracks\"", "</p>", 0, Direction::Forward)?;
    let (_, label_elem) =
        markup::find_element(block, "<p class=\"label\"", "</p>", 0, Direction::Forward)?;
    let (_, link_elem) =
        markup::find_element(block, "<a class=\"link\"", "</a>", 0, Direction::Forward)?;

    let id = markup::attribute_value(id_elem, "id")?.to_string();

    let mut record = Map::new();
    record.insert("store".into(), json!("redeye"));
    record.insert("id".into(), json!(id));
    record.insert("link".into(), json!(markup::attribute_value(link_elem, "href")?));
    record.insert("track_names".into(), json!(parse_track_names(tracks_elem)));

    let (artist, title) = parse_artist_title(artist_elem)?;
    record.insert("artist".into(), json!(artist));
    record.insert("title".into(), json!(title));

    match parse_label(label_elem) {
        Some((cat, label, label_link)) => {
            record.insert("cat".into(), json!(cat));
            record.insert("label".into(), json!(label));
            if let Some(link) = label_link {
                record.insert("label_link".into(), json!(link));
            }
        }
        None => warn!("label info not found for release {}", id),
    }

    let mut genre_tags = Map::new();
    for tag in tags {
        genre_tags.insert(tag.clone(), json!(true));
    }
    record.insert("tags".into(), Value::Object(genre_tags));

    let mut store_tags = Map::new();
    store_tags.insert("preorder".into(), json!(block.contains("price preorder")));
    if block.contains("Out Of Stock") {
        store_tags.insert("out_of_stock".into(), json!(true));
        store_tags.insert("has_been_out_of_stock".into(), json!(true));
    } else {
        store_tags.insert("out_of_stock".into(), json!(false));
    }
    record.insert("store_tags".into(), Value::Object(store_tags));

    Some((format!("redeye-{id}"), record))
}

/// `ARTIST - TITLE`, split on the first hyphen. A hyphen-less body is all
/// artist.
fn parse_artist_title(elem: &str) -> Option<(String, String)> {
    let body = markup::tag_body(elem)?;
    Some(match body.find('-') {
        Some(split) => (
            body[..split].trim().to_string(),
            body[split + 1..].trim().to_string(),
        ),
        None => (body.trim().to_string(), String::new()),
    })
}

/// The label element reads `CAT<br><a href="link">LABEL</a>`: three chained
/// `>`…`<` spans give the catalogue number, the `<br>` gap, and the name.
fn parse_label(elem: &str) -> Option<(String, String, Option<String>)> {
    let (cat_end, cat) = markup::enclosed_text(elem, ">", "<", 0)?;
    let (gap_end, _) = markup::enclosed_text(elem, ">", "<", cat_end)?;
    let (_, label) = markup::enclosed_text(elem, ">", "<", gap_end)?;
    let link = markup::attribute_value(elem, "href").map(str::to_string);
    Some((cat.to_string(), label.to_string(), link))
}

/// Track names separated by newlines, `/`, or `,` — first separator that
/// yields more than one entry wins. Entries are trimmed of whitespace and
/// stray commas, empties dropped.
fn parse_track_names(elem: &str) -> Vec<String> {
    let Some(body) = markup::tag_body(elem) else {
        return Vec::new();
    };
    let mut parts: Vec<&str> = body.lines().collect();
    if parts.len() == 1 {
        parts = body.split('/').collect();
    }
    if parts.len() == 1 {
        parts = body.split(',').collect();
    }
    parts
        .iter()
        .map(|p| p.trim().trim_matches(',').trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fill `track_urls`/`artworks` by probing the CDN, unless the registry
/// already has non-empty lists for this release (probing is slow).
async fn probe_release_assets(
    client: &Client,
    registry: &Registry,
    key: &str,
    record: &mut Map<String, Value>,
) {
    let id = record
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let existing = registry.get(key);
    let has = |field: &str| {
        existing
            .and_then(|r| r.get(field))
            .and_then(Value::as_array)
            .is_some_and(|a| !a.is_empty())
    };

    debug!("probing release asset urls: {}", id);
    if !has("track_urls") {
        record.insert("track_urls".into(), json!(snippet_urls(client, &id).await));
    }
    if !has("artworks") {
        record.insert("artworks".into(), json!(artwork_urls(client, &id).await));
    }
}

/// Snippets follow `<id>.mp3`, `<id>b.mp3`, `<id>c.mp3`… — walk the sides
/// until the first miss.
async fn snippet_urls(client: &Client, release_id: &str) -> Vec<String> {
    let mut tracks = Vec::new();
    let first = format!("{SNIPPET_CDN}/{release_id}.mp3");
    if !fetch::probe_exists(client, &first).await {
        return tracks;
    }
    tracks.push(first);

    let mut side = b'b';
    loop {
        let url = format!("{SNIPPET_CDN}/{release_id}{}.mp3", side as char);
        if !fetch::probe_exists(client, &url).await {
            break;
        }
        tracks.push(url);
        side += 1;
    }
    tracks
}

/// Artwork sizes are indexed `<id>-0.jpg` … `<id>-2.jpg`; keep the ones
/// that exist.
async fn artwork_urls(client: &Client, release_id: &str) -> Vec<String> {
    let mut artworks = Vec::new();
    for index in 0..3 {
        let url = format!("{IMAGERY_BASE}/{release_id}-{index}.jpg");
        if fetch::probe_exists(client, &url).await {
            artworks.push(url);
        }
    }
    artworks
}

/// When the merged record's track names don't pair one-to-one with its
/// snippet URLs, try re-splitting the name blob. A still-mismatched list is
/// persisted as-is.
fn reconcile_tracks(registry: &mut Registry, key: &str) {
    let Some(record) = registry.get_mut(key) else {
        return;
    };
    let url_count = record
        .get("track_urls")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    if url_count == 0 {
        return;
    }
    let names: Vec<String> = record
        .get("track_names")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if names.len() == url_count {
        return;
    }
    let resplit = reparse_and_split_tracks(names, url_count);
    if let Some(map) = record.as_object_mut() {
        map.insert("track_names".into(), json!(resplit));
    }
}

/// Split a single concatenated name blob at successive side/track markers
/// (`a2`, `a3`…, then `b1`…), case-insensitively, until the target count is
/// reached or the iteration cap hits; the remainder becomes the final name.
/// Best-effort: irregular markers can under- or over-split.
fn reparse_and_split_tracks(track_names: Vec<String>, target: usize) -> Vec<String> {
    if track_names.len() != 1 {
        return track_names;
    }
    let Some(mut concated) = track_names.into_iter().next() else {
        return Vec::new();
    };

    let mut output = Vec::new();
    let mut side = b'a';
    let mut track = 2u32;
    let mut iterations = 0usize;

    while output.len() < target {
        let marker = format!("{}{}", side as char, track);
        let split = concated
            .find(&marker)
            .or_else(|| concated.find(&marker.to_uppercase()));
        match split {
            Some(pos) => {
                let tail = concated.split_off(pos);
                output.push(concated);
                concated = tail;
                track += 1;
            }
            None => {
                side += 1;
                track = 1;
            }
        }
        if iterations > target {
            break;
        }
        iterations += 1;
    }

    if !concated.is_empty() {
        output.push(concated);
    }
    output
}

// ── Tests ──
