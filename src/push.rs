use std::path::Path;

use anyhow::{ensure, Context, Result};
use reqwest::Client;
use tracing::info;

const DATABASE_URL: &str =
    "https://vinyl-digger-default-rtdb.europe-west1.firebasedatabase.app";

/// Push the serialized registry to the remote database: a GET of the
/// database root gates the write (reachability + auth check), then the whole
/// body goes up as a single PATCH so untouched remote keys survive.
pub async fn patch_releases(client: &Client, key_file: &Path, body: &str) -> Result<()> {
    let token = std::fs::read_to_string(key_file)
        .with_context(|| format!("failed to read key file {}", key_file.display()))?
        .trim()
        .to_string();

    let probe = client
        .get(format!("{DATABASE_URL}/.json?shallow=true"))
        .bearer_auth(&token)
        .send()
        .await
        .context("database reachability check failed")?;
    ensure!(
        probe.status().is_success(),
        "database unreachable: {}",
        probe.status()
    );

    let response = client
        .patch(format!("{DATABASE_URL}/releases.json"))
        .bearer_auth(&token)
        .body(body.to_string())
        .send()
        .await
        .context("registry push failed")?;
    ensure!(
        response.status().is_success(),
        "registry push rejected: {}",
        response.status()
    );

    info!("pushed registry ({} bytes)", body.len());
    Ok(())
}
