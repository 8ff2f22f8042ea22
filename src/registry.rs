//! Fetch a country's IPv4 allocations from a registry delegated-stats feed.
//!
//! Feed lines look like `apnic|BD|ipv4|103.4.144.0|1024|20100922|allocated`.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const APNIC_DELEGATED_URL: &str = "https://ftp.apnic.net/stats/apnic/delegated-apnic-latest";

/// Extract `"<start>/<count>"` descriptors for `country` from feed text.
pub fn parse_delegated(text: &str, country: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 7 {
            continue;
        }
        if parts[1].eq_ignore_ascii_case(country) && parts[2].eq_ignore_ascii_case("ipv4") {
            out.push(format!("{}/{}", parts[3], parts[4]));
        }
    }
    out
}

/// Download the feed and keep `country`'s IPv4 entries.
pub async fn fetch_country_ranges(
    url: &str,
    country: &str,
    timeout: Duration,
) -> Result<Vec<String>> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")?;
    info!(url, country, "fetching registry allocations");
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to fetch {url}"))?;
    let status = resp.status();
    if !status.is_success() {
        bail!("registry returned status {status}");
    }
    let body = resp.text().await.context("failed to read registry response")?;
    let ranges = parse_delegated(&body, country);
    debug!(lines = body.lines().count(), ranges = ranges.len(), "registry feed parsed");
    Ok(ranges)
}

/// Write descriptors one per line. An empty list is refused so a failed fetch
/// never clobbers a previously saved file.
pub fn save_ranges(path: impl AsRef<Path>, ranges: &[String]) -> Result<()> {
    let path = path.as_ref();
    if ranges.is_empty() {
        bail!("no ranges to save to {}", path.display());
    }
    std::fs::write(path, ranges.join("\n"))
        .with_context(|| format!("failed to write range file: {}", path.display()))?;
    info!(path = %path.display(), ranges = ranges.len(), "saved IP ranges");
    Ok(())
}

/// Range file name for a country code, e.g. `BD_IP.txt`.
pub fn default_ranges_name(country: &str) -> String {
    format!("{}_IP.txt", country.to_ascii_uppercase())
}
