//! Durable progress tracking.
//!
//! The success ledger is an append-only file of URLs whose capture is known to
//! be in the document store. It is a cache of "store already has this": a URL
//! is only ever appended after its insert committed. The failure log is
//! informational and never consulted when deciding what to archive.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::fs_utils::{append_line, read_nonblank_lines};

/// Append-only set of successfully stored capture URLs.
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    // Serializes appends from concurrent workers.
    write_lock: Mutex<()>,
}

impl ProgressLedger {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every ledgered URL. A missing file is an empty ledger.
    pub async fn load(&self) -> Result<HashSet<String>> {
        let lines = read_nonblank_lines(&self.path)
            .await
            .context("Failed to load success ledger")?;

        let set: HashSet<String> = lines.unwrap_or_default().into_iter().collect();
        debug!(path = %self.path.display(), count = set.len(), "Loaded success ledger");
        Ok(set)
    }

    /// Record `url` as durably stored.
    pub async fn append(&self, url: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        append_line(&self.path, url)
            .await
            .context("Failed to append to success ledger")
    }

    /// Candidates not yet in the ledger, in their original order.
    pub async fn pending(&self, candidates: &[String]) -> Result<Vec<String>> {
        let done = self.load().await?;
        let pending = filter_pending(candidates, &done);
        info!(
            already_done = candidates.len() - pending.len(),
            pending = pending.len(),
            "Filtered worklist against success ledger"
        );
        Ok(pending)
    }
}

/// Ordered difference `candidates \ done`.
#[must_use]
pub fn filter_pending(candidates: &[String], done: &HashSet<String>) -> Vec<String> {
    candidates
        .iter()
        .filter(|url| !done.contains(url.as_str()))
        .cloned()
        .collect()
}

/// Append-only diagnostic file, one `<url>: <reason>` line per failure.
#[derive(Debug)]
pub struct FailureLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FailureLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a failure line. The wall-clock time goes to the process log
    /// alongside; the file keeps the plain `<url>: <reason>` format.
    pub async fn record(&self, url: &str, reason: &str) -> Result<()> {
        // Keep one record per line even if the reason carries tool output.
        let reason = reason.replace(['\r', '\n'], " ");
        debug!(url = %url, at = %Utc::now().to_rfc3339(), "Recording failure");

        let _guard = self.write_lock.lock().await;
        append_line(&self.path, &format!("{url}: {reason}"))
            .await
            .context("Failed to append to error log")
    }
}

/// Load the worklist: one URL per line, blank lines and `#` comments ignored.
///
/// Duplicates are dropped, keeping the first occurrence.
pub async fn load_worklist(path: &Path) -> Result<Vec<String>> {
    let lines = read_nonblank_lines(path)
        .await?
        .with_context(|| format!("Worklist file not found: {}", path.display()))?;

    let mut seen = HashSet::new();
    Ok(lines
        .into_iter()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| seen.insert(line.clone()))
        .collect())
}
