mod config;
mod fetch;
mod markup;
mod push;
mod registry;
mod stores;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;

use registry::Registry;
use stores::ScrapeOptions;

const CONFIG_PATH: &str = "stores.json";

#[derive(Parser)]
#[command(name = "vinyl_scraper", about = "Record-store catalog scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a store's chart and new-release pages into the registry
    Scrape {
        /// Store to scrape (juno, redeye)
        #[arg(short, long)]
        store: String,
        /// Max pages per view (overrides the configured page_count)
        #[arg(short = 'n', long)]
        pages: Option<u32>,
        /// Stop after the first page of each scrape category
        #[arg(long)]
        test_single: bool,
        /// Probe snippet/artwork asset URLs (slow)
        #[arg(long)]
        probe_assets: bool,
    },
    /// Push the saved registry to the remote database
    Push {
        /// Store whose registry to push
        #[arg(short, long)]
        store: String,
        /// File holding the database access token
        #[arg(short, long)]
        key_file: PathBuf,
    },
    /// Show registry statistics
    Stats {
        /// Store whose registry to inspect
        #[arg(short, long)]
        store: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape {
            store,
            pages,
            test_single,
            probe_assets,
        } => {
            let stores_cfg = config::load(Path::new(CONFIG_PATH))?;
            let Some(store_cfg) = stores_cfg.get(&store) else {
                bail!("unknown store {store}");
            };

            let path = registry_path(&store);
            let mut registry = Registry::load(&path)?;
            let client = reqwest::Client::new();
            let opts = ScrapeOptions {
                pages,
                test_single,
                probe_assets,
            };

            match store.as_str() {
                "juno" => stores::juno::scrape(&client, store_cfg, &mut registry, &opts).await?,
                "redeye" => stores::redeye::scrape(&client, store_cfg, &mut registry, &opts).await?,
                other => bail!("no scraper implemented for store {other}"),
            }

            let now = chrono::Utc::now().timestamp();
            registry.stamp_added(now);
            registry.sort_by_rank(now);
            registry.save(&path)?;
            println!("{} releases in registry", registry.len());
        }
        Commands::Push { store, key_file } => {
            let path = registry_path(&store);
            let body = std::fs::read_to_string(&path)
                .with_context(|| format!("no registry for {store}, run scrape first"))?;
            let client = reqwest::Client::new();
            push::patch_releases(&client, &key_file, &body).await?;
            println!("Pushed {store} registry to remote database.");
        }
        Commands::Stats { store } => {
            let registry = Registry::load(&registry_path(&store))?;
            if registry.is_empty() {
                println!("No releases for {store}. Run scrape first.");
                return Ok(());
            }
            print_stats(&store, &registry);
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }
    Ok(())
}

fn registry_path(store: &str) -> PathBuf {
    PathBuf::from("registry").join(format!("{store}.json"))
}

fn print_stats(store: &str, registry: &Registry) {
    let store_tag = |record: &Value, field: &str| {
        record
            .get("store_tags")
            .and_then(|t| t.get(field))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };
    let non_empty = |record: &Value, field: &str| {
        record
            .get(field)
            .and_then(Value::as_array)
            .is_some_and(|a| !a.is_empty())
    };

    let mut charted = 0usize;
    let mut out_of_stock = 0usize;
    let mut preorders = 0usize;
    let mut with_tracks = 0usize;
    let mut with_artworks = 0usize;
    for (_, record) in registry.records() {
        charted += usize::from(store_tag(record, "has_charted"));
        out_of_stock += usize::from(store_tag(record, "out_of_stock"));
        preorders += usize::from(store_tag(record, "preorder"));
        with_tracks += usize::from(non_empty(record, "track_urls"));
        with_artworks += usize::from(non_empty(record, "artworks"));
    }

    println!("Store:        {}", store);
    println!("Releases:     {}", registry.len());
    println!("Charted:      {}", charted);
    println!("Out of stock: {}", out_of_stock);
    println!("Preorders:    {}", preorders);
    println!("With tracks:  {}", with_tracks);
    println!("With artwork: {}", with_artworks);
}
