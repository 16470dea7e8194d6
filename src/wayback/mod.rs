use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use tracing::{debug, info};

use crate::constants::{ARCHIVAL_USER_AGENT, WAYBACK_WEB_BASE};

/// Default CDX search endpoint.
pub const DEFAULT_CDX_API_URL: &str = "http://web.archive.org/cdx/search/cdx";

/// Optional bounds on the capture dates returned by discovery.
#[derive(Debug, Clone, Default)]
pub struct CdxQuery {
    /// Lower bound, a year or a timestamp prefix such as `2019`.
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Wayback CDX client used to turn a domain into a list of capture URLs.
pub struct CdxClient {
    client: Client,
    api_url: String,
}

impl CdxClient {
    /// Create a new CDX client against `api_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(ARCHIVAL_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    /// List replayable capture URLs of `target`, newest first.
    ///
    /// Only captures that returned HTTP 200 are listed, and captures with
    /// identical content are collapsed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the API answers with a
    /// non-success status, or the body is not the expected JSON table.
    pub async fn snapshots(&self, target: &str, query: &CdxQuery) -> Result<Vec<String>> {
        let mut params: Vec<(&str, &str)> = vec![
            ("url", target),
            ("output", "json"),
            ("collapse", "digest"),
            ("fl", "timestamp,original"),
            ("filter", "statuscode:200"),
        ];
        if let Some(from) = query.from.as_deref() {
            params.push(("from", from));
        }
        if let Some(to) = query.to.as_deref() {
            params.push(("to", to));
        }

        debug!(target_url = %target, api = %self.api_url, "Querying CDX API");

        let response = self
            .client
            .get(&self.api_url)
            .query(&params)
            .send()
            .await
            .context("Failed to query CDX API")?;

        let status = response.status();
        if !status.is_success() {
            bail!("CDX API returned {status} for {target}");
        }

        let rows: Vec<Vec<String>> = response
            .json()
            .await
            .context("Failed to parse CDX response")?;

        let urls = parse_cdx_rows(&rows);
        info!(target_url = %target, captures = urls.len(), "CDX discovery complete");
        Ok(urls)
    }
}

/// Convert CDX JSON rows into replay URLs, newest first.
///
/// The first row is the column header. Rows with fewer than two columns are
/// ignored.
#[must_use]
pub fn parse_cdx_rows(rows: &[Vec<String>]) -> Vec<String> {
    let mut urls: Vec<String> = rows
        .iter()
        .skip(1)
        .filter(|row| row.len() >= 2)
        .map(|row| format!("{WAYBACK_WEB_BASE}/{}if_/{}", row[0], row[1]))
        .collect();
    urls.reverse();
    urls
}

/// Write `urls` to `path`, one per line, replacing any existing file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn write_worklist(path: &Path, urls: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut body = urls.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write worklist: {}", path.display()))
}
