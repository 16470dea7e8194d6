//! Failure taxonomy for a single URL moving through the pipeline.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a capture URL could not be archived in this run.
///
/// Every variant is terminal for the URL except [`ArchiveError::StoreLocked`],
/// which the retry controller may absorb. Non-terminal conditions (cleanup and
/// integrity problems) are reported as [`crate::archiver::ReconcileWarning`]s
/// instead.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("capture timestamp could not be extracted from {url}: {reason}")]
    Extraction { url: String, reason: String },

    #[error("archive tool index database is locked: {detail}")]
    StoreLocked { detail: String },

    #[error("archive tool index database still locked after {attempts} attempts")]
    LockRetriesExhausted { attempts: u32 },

    #[error("archive tool failed: {0}")]
    InvokerFailure(String),

    #[error("archive tool reported success but produced no artifact for {url}: {detail}")]
    ArtifactMissing { url: String, detail: String },

    #[error("artifact {} is empty", path.display())]
    EmptyContent { path: PathBuf },

    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Category of an [`ArchiveError`], cheap to copy into reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    BadTimestamp,
    StoreLocked,
    LockRetriesExhausted,
    InvokerFailure,
    ArtifactMissing,
    EmptyContent,
    StoreUnavailable,
    Io,
    TaskPanicked,
}

impl FailureKind {
    /// Stable short label used in logs and the error file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadTimestamp => "bad_timestamp",
            Self::StoreLocked => "store_locked",
            Self::LockRetriesExhausted => "lock_retries_exhausted",
            Self::InvokerFailure => "invoker_failure",
            Self::ArtifactMissing => "artifact_missing",
            Self::EmptyContent => "empty_content",
            Self::StoreUnavailable => "store_unavailable",
            Self::Io => "io",
            Self::TaskPanicked => "task_panicked",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ArchiveError {
    /// Only lock contention in the external tool is worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreLocked { .. })
    }

    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Extraction { .. } => FailureKind::BadTimestamp,
            Self::StoreLocked { .. } => FailureKind::StoreLocked,
            Self::LockRetriesExhausted { .. } => FailureKind::LockRetriesExhausted,
            Self::InvokerFailure(_) => FailureKind::InvokerFailure,
            Self::ArtifactMissing { .. } => FailureKind::ArtifactMissing,
            Self::EmptyContent { .. } => FailureKind::EmptyContent,
            Self::StoreUnavailable(_) => FailureKind::StoreUnavailable,
            Self::Io { .. } => FailureKind::Io,
        }
    }
}
