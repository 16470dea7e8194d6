//! Wrapper around the external archiving tool.
//!
//! The tool is invoked as `<tool> add <url> [<url> ...]` from inside the
//! archive root. For every snapshot it creates it prints a line containing
//! `> ./archive/<artifact-id>`, and it leaves the consolidated page at
//! `<root>/archive/<artifact-id>/singlefile.html`. The tool keeps its own
//! single-writer index database next to the artifacts and fails with
//! "database is locked" when another invocation holds it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::constants::{
    ARTIFACT_HTML_FILE, ARTIFACT_SUBDIR, STORE_LOCKED_MARKER, TOOL_INDEX_DB,
};
use crate::error::ArchiveError;
use crate::user_agent::random_user_agent;

/// Default timeout for one tool invocation in seconds.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;

/// Max chars of tool output kept in error messages and logs, per stream.
const MAX_OUTPUT_LEN: usize = 2000;

static ARTIFACT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"> \./archive/([\w.]+)/?").expect("artifact path pattern is valid")
});

/// Configuration for the external archiving tool.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Path to the tool executable.
    pub path: String,
    /// Working directory of the tool; artifacts land under `<root>/archive/`.
    pub archive_root: PathBuf,
    /// Upper bound on one invocation. Expiry kills the process.
    pub timeout: Duration,
    /// Hand each invocation a fresh random user agent.
    pub random_user_agent: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: "archivebox".to_string(),
            archive_root: PathBuf::from("."),
            timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            random_user_agent: false,
        }
    }
}

/// The artifact directory the tool produced for one input URL, or why there
/// is none.
#[derive(Debug)]
pub struct ArtifactSlot {
    pub url: String,
    pub artifact: Result<PathBuf, ArchiveError>,
}

/// Something that turns capture URLs into on-disk artifacts.
///
/// An `Err` fails the whole call (tool crash, lock contention, timeout); a
/// per-URL problem is reported in that URL's slot. Implementations return one
/// slot per input URL, in input order.
#[async_trait]
pub trait ArchiveInvoker: Send + Sync {
    async fn archive(&self, urls: &[String]) -> Result<Vec<ArtifactSlot>, ArchiveError>;
}

/// Subprocess-backed [`ArchiveInvoker`].
#[derive(Debug, Clone)]
pub struct ArchiveTool {
    config: ToolConfig,
}

impl ArchiveTool {
    #[must_use]
    pub fn new(mut config: ToolConfig) -> Self {
        if let Ok(root) = std::path::absolute(&config.archive_root) {
            config.archive_root = root;
        }
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ToolConfig {
        &self.config
    }
}

#[async_trait]
impl ArchiveInvoker for ArchiveTool {
    async fn archive(&self, urls: &[String]) -> Result<Vec<ArtifactSlot>, ArchiveError> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = urls.len(), first = %urls[0], "Invoking archive tool");

        let mut cmd = Command::new(&self.config.path);
        cmd.arg("add").args(urls);
        cmd.current_dir(&self.config.archive_root);

        if self.config.random_user_agent {
            cmd.env("CHROME_USER_AGENT", random_user_agent());
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Dropping the future on timeout must not leave the tool running.
        cmd.kill_on_drop(true);

        let output = match tokio::time::timeout(self.config.timeout, cmd.output()).await {
            Err(_) => {
                return Err(ArchiveError::InvokerFailure(format!(
                    "timed out after {:?}",
                    self.config.timeout
                )))
            }
            Ok(Err(e)) => {
                return Err(ArchiveError::InvokerFailure(format!(
                    "failed to execute {}: {e}",
                    self.config.path
                )))
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(classify_failure(output.status.code(), &stdout, &stderr));
        }

        let ids = parse_artifact_ids(&stdout);
        if ids.len() != urls.len() {
            warn!(
                expected = urls.len(),
                found = ids.len(),
                first = %urls[0],
                "Artifact count in tool output does not match batch size; associating by output order"
            );
        }

        Ok(resolve_artifacts(&self.config.archive_root, urls, &ids).await)
    }
}

/// Artifact identifiers printed by the tool, in output order, without repeats.
#[must_use]
pub fn parse_artifact_ids(stdout: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for caps in ARTIFACT_PATH.captures_iter(stdout) {
        let id = caps[1].to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Pair URLs with artifact ids by position and check each artifact's page file.
pub async fn resolve_artifacts(
    archive_root: &Path,
    urls: &[String],
    ids: &[String],
) -> Vec<ArtifactSlot> {
    let mut slots = Vec::with_capacity(urls.len());

    for (i, url) in urls.iter().enumerate() {
        let artifact = match ids.get(i) {
            None => Err(ArchiveError::ArtifactMissing {
                url: url.clone(),
                detail: "no artifact path in tool output".to_string(),
            }),
            Some(id) => {
                let dir = archive_root.join(ARTIFACT_SUBDIR).join(id);
                let html = dir.join(ARTIFACT_HTML_FILE);
                match tokio::fs::try_exists(&html).await {
                    Ok(true) => Ok(dir),
                    Ok(false) => Err(ArchiveError::ArtifactMissing {
                        url: url.clone(),
                        detail: format!("{} does not exist", html.display()),
                    }),
                    Err(e) => Err(ArchiveError::Io {
                        path: html,
                        source: e,
                    }),
                }
            }
        };
        slots.push(ArtifactSlot {
            url: url.clone(),
            artifact,
        });
    }

    slots
}

/// Map a non-zero exit to the lock-contention or generic failure case.
#[must_use]
pub fn classify_failure(code: Option<i32>, stdout: &str, stderr: &str) -> ArchiveError {
    let stdout_trimmed = truncate_output(stdout);
    let stderr_trimmed = truncate_output(stderr);

    let locked = stderr.to_lowercase().contains(STORE_LOCKED_MARKER)
        || stdout.to_lowercase().contains(STORE_LOCKED_MARKER);

    if locked {
        return ArchiveError::StoreLocked {
            detail: if stderr_trimmed.is_empty() {
                stdout_trimmed
            } else {
                stderr_trimmed
            },
        };
    }

    ArchiveError::InvokerFailure(format!(
        "exit code {code:?}\nStderr:\n{stderr_trimmed}\nStdout:\n{stdout_trimmed}"
    ))
}

fn truncate_output(text: &str) -> String {
    let text = text.trim();
    if text.len() <= MAX_OUTPUT_LEN {
        return text.to_string();
    }
    let mut cut = MAX_OUTPUT_LEN;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}...[truncated {} more chars]",
        &text[..cut],
        text.len() - cut
    )
}

/// Check if the tool is available and working.
pub async fn check_tool(path: &str) -> Result<String> {
    let output = Command::new(path)
        .arg("--version")
        .output()
        .await
        .with_context(|| format!("Failed to execute {path}"))?;

    if !output.status.success() {
        anyhow::bail!("{path} --version exited with {:?}", output.status.code());
    }

    let version = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(version)
}

/// Switch the tool's index database to WAL so concurrent invocations contend less.
///
/// Returns the resulting journal mode, or `None` when the index does not exist yet.
pub async fn enable_wal_mode(archive_root: &Path) -> Result<Option<String>> {
    let index = archive_root.join(TOOL_INDEX_DB);
    if !tokio::fs::try_exists(&index).await.unwrap_or(false) {
        debug!(path = %index.display(), "Tool index database not found, skipping WAL setup");
        return Ok(None);
    }

    let mut conn = SqliteConnectOptions::new()
        .filename(&index)
        .busy_timeout(Duration::from_secs(10))
        .connect()
        .await
        .with_context(|| format!("Failed to open {}", index.display()))?;

    let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode=WAL")
        .fetch_one(&mut conn)
        .await
        .context("Failed to set journal mode")?;

    conn.close().await.ok();
    info!(path = %index.display(), journal_mode = %mode, "Tool index journal mode set");
    Ok(Some(mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OUTPUT: &str = "\
[+] [2024-01-01 10:00:00] Adding 1 links to index
    > ./archive/1704103200.123456
[*] Starting archiving of 1 snapshots in index...
[+] [2024-01-01 10:00:05] \"Example Domain\"
    http://web.archive.org/web/20200101000000/http://example.com
    > ./archive/1704103200.123456
      √ ./archive/1704103200.123456/singlefile.html
";

    #[test]
    fn test_default_config() {
        let config = ToolConfig::default();
        assert_eq!(config.path, "archivebox");
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert!(!config.random_user_agent);
    }

    #[test]
    fn test_parse_artifact_ids_dedupes() {
        assert_eq!(
            parse_artifact_ids(SAMPLE_OUTPUT),
            vec!["1704103200.123456".to_string()]
        );
    }

    #[test]
    fn test_parse_artifact_ids_batch_order() {
        let out = "> ./archive/111.1\nnoise\n> ./archive/222.2/\n> ./archive/333.3";
        assert_eq!(
            parse_artifact_ids(out),
            vec!["111.1".to_string(), "222.2".to_string(), "333.3".to_string()]
        );
    }

    #[test]
    fn test_parse_artifact_ids_none() {
        assert!(parse_artifact_ids("[!] nothing archived").is_empty());
    }

    #[test]
    fn test_classify_lock_error() {
        let err = classify_failure(
            Some(1),
            "",
            "sqlite3.OperationalError: Database is locked",
        );
        assert!(matches!(err, ArchiveError::StoreLocked { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_lock_error_on_stdout() {
        let err = classify_failure(Some(1), "database is locked", "");
        assert!(matches!(err, ArchiveError::StoreLocked { .. }));
    }

    #[test]
    fn test_classify_other_failure() {
        let err = classify_failure(Some(2), "", "Invalid URL");
        assert!(matches!(err, ArchiveError::InvokerFailure(_)));
        assert!(err.to_string().contains("Invalid URL"));
    }

    #[test]
    fn test_truncate_output() {
        let long = "x".repeat(MAX_OUTPUT_LEN + 10);
        let truncated = truncate_output(&long);
        assert!(truncated.ends_with("[truncated 10 more chars]"));
        assert_eq!(truncate_output("  short \n"), "short");
    }

    #[tokio::test]
    async fn test_resolve_artifacts_checks_page_file() {
        let root = tempfile::TempDir::new().unwrap();
        let good = root.path().join("archive").join("1.1");
        tokio::fs::create_dir_all(&good).await.unwrap();
        tokio::fs::write(good.join("singlefile.html"), "<html></html>")
            .await
            .unwrap();
        tokio::fs::create_dir_all(root.path().join("archive").join("2.2"))
            .await
            .unwrap();

        let urls = vec!["u1".to_string(), "u2".to_string(), "u3".to_string()];
        let ids = vec!["1.1".to_string(), "2.2".to_string()];
        let slots = resolve_artifacts(root.path(), &urls, &ids).await;

        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].artifact.as_ref().unwrap(), &good);
        assert!(matches!(
            slots[1].artifact,
            Err(ArchiveError::ArtifactMissing { .. })
        ));
        assert!(matches!(
            slots[2].artifact,
            Err(ArchiveError::ArtifactMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_enable_wal_without_index_is_noop() {
        let root = tempfile::TempDir::new().unwrap();
        assert!(enable_wal_mode(root.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_executable_is_invoker_failure() {
        let root = tempfile::TempDir::new().unwrap();
        let tool = ArchiveTool::new(ToolConfig {
            path: "/nonexistent/archive-tool".to_string(),
            archive_root: root.path().to_path_buf(),
            ..ToolConfig::default()
        });
        let err = tool
            .archive(&["http://x.org/web/20200101000000/http://example.com".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvokerFailure(_)));
    }
}
