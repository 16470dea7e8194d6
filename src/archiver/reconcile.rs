//! Moves a finished artifact from local disk into the capture store.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::constants::ARTIFACT_HTML_FILE;
use crate::db::{CaptureRecord, CaptureStore};
use crate::error::ArchiveError;
use crate::ledger::ProgressLedger;
use crate::timestamp::{capture_time, UrlValidation};

/// A problem noticed after the capture was committed. Never undoes the insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileWarning {
    /// The artifact directory could not be removed.
    CleanupFailed { dir: PathBuf, error: String },
    /// Stored content hashes differently from the file on disk.
    IntegrityMismatch { expected: String, actual: String },
    /// Read-back for the integrity check failed or found nothing.
    IntegrityUnverified(String),
    /// The store has the capture but the ledger append failed, so a later run
    /// may archive this URL again.
    LedgerWriteFailed(String),
}

impl fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CleanupFailed { dir, error } => {
                write!(f, "cleanup_warning: failed to remove {}: {error}", dir.display())
            }
            Self::IntegrityMismatch { expected, actual } => {
                write!(f, "integrity_mismatch: expected sha256 {expected}, stored {actual}")
            }
            Self::IntegrityUnverified(reason) => write!(f, "integrity_unverified: {reason}"),
            Self::LedgerWriteFailed(reason) => write!(f, "ledger_write_failed: {reason}"),
        }
    }
}

/// Result of a successful reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Identifier the store assigned to the capture.
    pub id: i64,
    pub warnings: Vec<ReconcileWarning>,
}

/// Settings that shape every record the reconciler writes.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub device_profile: String,
    pub validation: UrlValidation,
    pub verify_integrity: bool,
}

pub struct Reconciler {
    store: Arc<dyn CaptureStore>,
    ledger: Arc<ProgressLedger>,
    options: ReconcileOptions,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn CaptureStore>,
        ledger: Arc<ProgressLedger>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            store,
            ledger,
            options,
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<ProgressLedger> {
        &self.ledger
    }

    /// Store the page in `artifact_dir` as the capture for `url`.
    ///
    /// On success the capture is committed, the artifact directory is gone
    /// (best effort), and `url` is in the ledger.
    ///
    /// # Errors
    ///
    /// Fails without touching the store on unreadable, non-UTF-8 or empty
    /// content and on a bad capture timestamp; fails with
    /// [`ArchiveError::StoreUnavailable`] when the insert does not commit.
    pub async fn reconcile(
        &self,
        url: &str,
        artifact_dir: &Path,
    ) -> Result<ReconcileOutcome, ArchiveError> {
        let html_path = artifact_dir.join(ARTIFACT_HTML_FILE);
        let content = read_page(url, &html_path).await?;
        let captured_at = capture_time(url, self.options.validation)?;

        let record = CaptureRecord::new(
            url,
            captured_at,
            content,
            self.options.device_profile.as_str(),
        );

        let id = self
            .store
            .insert_capture(&record)
            .await
            .map_err(|e| ArchiveError::StoreUnavailable(format!("{e:#}")))?;

        info!(url = %url, id, captured_at = %captured_at, "Capture stored");

        let mut warnings = Vec::new();

        if self.options.verify_integrity {
            if let Some(warning) = self.verify(id, &record.content).await {
                warn!(url = %url, id, "{warning}");
                warnings.push(warning);
            }
        }

        match tokio::fs::remove_dir_all(artifact_dir).await {
            Ok(()) => debug!(dir = %artifact_dir.display(), "Artifact directory removed"),
            Err(e) => {
                let warning = ReconcileWarning::CleanupFailed {
                    dir: artifact_dir.to_path_buf(),
                    error: e.to_string(),
                };
                warn!(url = %url, "{warning}");
                warnings.push(warning);
            }
        }

        if let Err(e) = self.ledger.append(url).await {
            error!(url = %url, id, "Capture stored but ledger append failed: {e:#}");
            warnings.push(ReconcileWarning::LedgerWriteFailed(format!("{e:#}")));
        }

        Ok(ReconcileOutcome { id, warnings })
    }

    async fn verify(&self, id: i64, original: &[u8]) -> Option<ReconcileWarning> {
        let expected = content_hash(original);
        match self.store.fetch_content(id).await {
            Ok(Some(stored)) => {
                let actual = content_hash(&stored);
                if actual == expected {
                    debug!(id, hash = %actual, "Integrity verified");
                    None
                } else {
                    Some(ReconcileWarning::IntegrityMismatch { expected, actual })
                }
            }
            Ok(None) => Some(ReconcileWarning::IntegrityUnverified(format!(
                "capture {id} not found on read-back"
            ))),
            Err(e) => Some(ReconcileWarning::IntegrityUnverified(format!("{e:#}"))),
        }
    }
}

async fn read_page(url: &str, html_path: &Path) -> Result<Vec<u8>, ArchiveError> {
    let content = match tokio::fs::read(html_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArchiveError::ArtifactMissing {
                url: url.to_string(),
                detail: format!("{} does not exist", html_path.display()),
            })
        }
        Err(e) => {
            return Err(ArchiveError::Io {
                path: html_path.to_path_buf(),
                source: e,
            })
        }
    };

    if content.is_empty() {
        return Err(ArchiveError::EmptyContent {
            path: html_path.to_path_buf(),
        });
    }

    if let Err(e) = std::str::from_utf8(&content) {
        return Err(ArchiveError::Io {
            path: html_path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        });
    }

    Ok(content)
}

/// Hex SHA-256 of `bytes`.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;

    const URL: &str = "http://x.org/web/20200101000000/http://example.com";

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<CaptureRecord>>,
        corrupt_reads: bool,
    }

    #[async_trait]
    impl CaptureStore for MemoryStore {
        async fn insert_capture(&self, record: &CaptureRecord) -> Result<i64> {
            let mut records = self.records.lock().unwrap();
            records.push(record.clone());
            Ok(i64::try_from(records.len()).unwrap())
        }

        async fn fetch_content(&self, id: i64) -> Result<Option<Vec<u8>>> {
            let records = self.records.lock().unwrap();
            let idx = usize::try_from(id - 1).unwrap();
            Ok(records.get(idx).map(|r| {
                let mut content = r.content.clone();
                if self.corrupt_reads {
                    content.push(b'!');
                }
                content
            }))
        }
    }

    fn reconciler(store: Arc<MemoryStore>, ledger_dir: &Path) -> Reconciler {
        Reconciler::new(
            store,
            Arc::new(ProgressLedger::new(ledger_dir.join("success.txt"))),
            ReconcileOptions {
                device_profile: "--window-size=1280,720".to_string(),
                validation: UrlValidation::Standard,
                verify_integrity: true,
            },
        )
    }

    async fn artifact(root: &Path, body: &str) -> PathBuf {
        let dir = root.join("archive").join("1577836800.0");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("singlefile.html"), body).await.unwrap();
        dir
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_reconcile_stores_and_cleans_up() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = artifact(tmp.path(), "<html>ok</html>").await;
        let store = Arc::new(MemoryStore::default());
        let rec = reconciler(Arc::clone(&store), tmp.path());

        let outcome = rec.reconcile(URL, &dir).await.unwrap();

        assert_eq!(outcome.id, 1);
        assert!(outcome.warnings.is_empty());
        assert!(!dir.exists());

        let records = store.records.lock().unwrap();
        assert_eq!(records[0].content, b"<html>ok</html>");
        assert_eq!(records[0].captured_at.to_rfc3339(), "2020-01-01T00:00:00+00:00");
        assert!(!records[0].advertising_modified);
        assert!(records[0].advertising_modified_id.is_none());
        drop(records);

        assert!(rec.ledger().load().await.unwrap().contains(URL));
    }

    #[tokio::test]
    async fn test_empty_page_is_not_stored() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = artifact(tmp.path(), "").await;
        let store = Arc::new(MemoryStore::default());
        let rec = reconciler(Arc::clone(&store), tmp.path());

        let err = rec.reconcile(URL, &dir).await.unwrap_err();

        assert!(matches!(err, ArchiveError::EmptyContent { .. }));
        assert!(store.records.lock().unwrap().is_empty());
        assert!(rec.ledger().load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_timestamp_is_not_stored() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = artifact(tmp.path(), "<html></html>").await;
        let store = Arc::new(MemoryStore::default());
        let rec = reconciler(Arc::clone(&store), tmp.path());

        let err = rec
            .reconcile("http://x.org/web/2020/http://example.com", &dir)
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::Extraction { .. }));
        assert!(store.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_integrity_mismatch_is_a_warning() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = artifact(tmp.path(), "<html>ok</html>").await;
        let store = Arc::new(MemoryStore {
            corrupt_reads: true,
            ..MemoryStore::default()
        });
        let rec = reconciler(Arc::clone(&store), tmp.path());

        let outcome = rec.reconcile(URL, &dir).await.unwrap();

        assert!(matches!(
            outcome.warnings.as_slice(),
            [ReconcileWarning::IntegrityMismatch { .. }]
        ));
        assert!(rec.ledger().load().await.unwrap().contains(URL));
    }

    #[tokio::test]
    async fn test_missing_page_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let rec = reconciler(store, tmp.path());

        let err = rec
            .reconcile(URL, &tmp.path().join("archive").join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::ArtifactMissing { .. }));
    }

    #[tokio::test]
    async fn test_non_utf8_page_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("archive").join("bin");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("singlefile.html"), [0xff, 0xfe, 0x00])
            .await
            .unwrap();
        let store = Arc::new(MemoryStore::default());
        let rec = reconciler(Arc::clone(&store), tmp.path());

        let err = rec.reconcile(URL, &dir).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
        assert!(store.records.lock().unwrap().is_empty());
    }
}
