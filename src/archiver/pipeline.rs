//! One unit of scheduled work: archive a batch of URLs and reconcile each artifact.

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::reconcile::{ReconcileWarning, Reconciler};
use super::retry::RetryPolicy;
use super::tool::{ArchiveInvoker, ArtifactSlot};
use crate::error::{ArchiveError, FailureKind};
use crate::ledger::FailureLog;

/// What happened to one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlOutcome {
    Stored {
        id: i64,
        warnings: Vec<ReconcileWarning>,
    },
    Failed {
        kind: FailureKind,
        reason: String,
    },
    /// Never attempted because the run was stopped early.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlReport {
    pub url: String,
    pub outcome: UrlOutcome,
}

impl UrlReport {
    #[must_use]
    pub fn is_stored(&self) -> bool {
        matches!(self.outcome, UrlOutcome::Stored { .. })
    }

    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.outcome {
            UrlOutcome::Failed { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

pub struct Pipeline {
    invoker: Arc<dyn ArchiveInvoker>,
    reconciler: Reconciler,
    retry: RetryPolicy,
    failures: Arc<FailureLog>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        invoker: Arc<dyn ArchiveInvoker>,
        reconciler: Reconciler,
        retry: RetryPolicy,
        failures: Arc<FailureLog>,
    ) -> Self {
        Self {
            invoker,
            reconciler,
            retry,
            failures,
        }
    }

    #[must_use]
    pub fn failures(&self) -> &Arc<FailureLog> {
        &self.failures
    }

    /// Archive and reconcile `urls`, returning one report per URL.
    ///
    /// Every terminal failure is written to the failure log here; nothing
    /// escapes as an error.
    pub async fn process_batch(&self, urls: &[String]) -> Vec<UrlReport> {
        let Some(first) = urls.first() else {
            return Vec::new();
        };
        let label = if urls.len() == 1 {
            first.clone()
        } else {
            format!("{first} (+{} more)", urls.len() - 1)
        };

        let slots = self
            .retry
            .run(&label, |attempt| {
                debug!(batch = %label, attempt, "Archiving");
                self.invoker.archive(urls)
            })
            .await;

        let slots = match slots {
            Ok(slots) => slots,
            Err(e) => {
                error!(batch = %label, kind = %e.kind(), "Archive tool invocation failed: {e}");
                let mut reports = Vec::with_capacity(urls.len());
                for url in urls {
                    reports.push(self.fail(url, e.kind(), e.to_string()).await);
                }
                return reports;
            }
        };

        let mut reports = Vec::with_capacity(urls.len());
        let mut slots = slots.into_iter();

        for url in urls {
            let slot = match slots.next() {
                Some(slot) if &slot.url == url => slot,
                other => {
                    // Invoker broke its one-slot-per-URL contract; trust nothing after this.
                    warn!(url = %url, got = ?other.map(|s| s.url), "Artifact slot out of order");
                    ArtifactSlot {
                        url: url.clone(),
                        artifact: Err(ArchiveError::ArtifactMissing {
                            url: url.clone(),
                            detail: "invoker returned no matching artifact".to_string(),
                        }),
                    }
                }
            };
            reports.push(self.reconcile_slot(slot).await);
        }

        reports
    }

    async fn reconcile_slot(&self, slot: ArtifactSlot) -> UrlReport {
        let ArtifactSlot { url, artifact } = slot;

        let dir = match artifact {
            Ok(dir) => dir,
            Err(e) => {
                error!(url = %url, kind = %e.kind(), "No usable artifact: {e}");
                return self.fail(&url, e.kind(), e.to_string()).await;
            }
        };

        match self.reconciler.reconcile(&url, &dir).await {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    if matches!(warning, ReconcileWarning::CleanupFailed { .. }) {
                        self.note(&url, &warning.to_string()).await;
                    }
                }
                UrlReport {
                    url,
                    outcome: UrlOutcome::Stored {
                        id: outcome.id,
                        warnings: outcome.warnings,
                    },
                }
            }
            Err(e) => {
                error!(url = %url, kind = %e.kind(), "Reconcile failed: {e}");
                self.fail(&url, e.kind(), e.to_string()).await
            }
        }
    }

    async fn fail(&self, url: &str, kind: FailureKind, reason: String) -> UrlReport {
        self.note(url, &format!("{kind}: {reason}")).await;
        UrlReport {
            url: url.to_string(),
            outcome: UrlOutcome::Failed { kind, reason },
        }
    }

    async fn note(&self, url: &str, line: &str) {
        if let Err(e) = self.failures.record(url, line).await {
            error!(url = %url, "Failed to write error log: {e:#}");
        }
    }
}
