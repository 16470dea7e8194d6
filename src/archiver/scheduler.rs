//! Bounded-concurrency dispatch of the worklist.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::pipeline::{Pipeline, UrlOutcome, UrlReport};
use crate::error::FailureKind;

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Stored URLs that came back with at least one warning.
    pub with_warnings: usize,
}

impl RunSummary {
    fn tally(&mut self, report: &UrlReport) {
        self.total += 1;
        match &report.outcome {
            UrlOutcome::Stored { warnings, .. } => {
                self.succeeded += 1;
                if !warnings.is_empty() {
                    self.with_warnings += 1;
                }
            }
            UrlOutcome::Failed { .. } => self.failed += 1,
            UrlOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Split `urls` into tasks of at most `batch_size` URLs, preserving order.
#[must_use]
pub fn partition(urls: &[String], batch_size: usize) -> Vec<Vec<String>> {
    urls.chunks(batch_size.max(1)).map(<[String]>::to_vec).collect()
}

/// Tracks consecutive store failures across workers and stops dispatch once
/// the store looks down for good.
#[derive(Debug)]
struct StoreHealth {
    consecutive_failures: AtomicUsize,
    limit: usize,
    cancel: CancellationToken,
}

impl StoreHealth {
    fn observe(&self, reports: &[UrlReport]) {
        for report in reports {
            match report.failure_kind() {
                Some(FailureKind::StoreUnavailable) => {
                    let seen = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                    if self.limit > 0 && seen >= self.limit && !self.cancel.is_cancelled() {
                        error!(
                            consecutive_failures = seen,
                            "Capture store keeps failing; not dispatching remaining work"
                        );
                        self.cancel.cancel();
                    }
                }
                None if report.is_stored() => {
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                }
                _ => {}
            }
        }
    }
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    workers: usize,
    batch_size: usize,
    max_store_failures: usize,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// `max_store_failures == 0` disables the early stop.
    #[must_use]
    pub fn new(
        pipeline: Arc<Pipeline>,
        workers: usize,
        batch_size: usize,
        max_store_failures: usize,
    ) -> Self {
        Self {
            pipeline,
            workers: workers.max(1),
            batch_size: batch_size.max(1),
            max_store_failures,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops dispatch when cancelled. Tasks already running finish;
    /// the rest are reported as skipped.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Process every URL in `work`, at most `workers` tasks at a time.
    ///
    /// Returns once all tasks have finished. A failing or panicking task only
    /// affects its own URLs.
    pub async fn run(&self, work: &[String]) -> RunSummary {
        let batches = partition(work, self.batch_size);
        info!(
            urls = work.len(),
            tasks = batches.len(),
            workers = self.workers,
            batch_size = self.batch_size,
            "Dispatching worklist"
        );
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let health = Arc::new(StoreHealth {
            consecutive_failures: AtomicUsize::new(0),
            limit: self.max_store_failures,
            cancel: self.shutdown.child_token(),
        });

        let mut summary = RunSummary::default();
        let mut handles = Vec::with_capacity(batches.len());

        for batch in batches {
            if health.cancel.is_cancelled() {
                for url in batch {
                    summary.tally(&skipped(url));
                }
                continue;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                () = health.cancel.cancelled() => None,
            };
            let Some(permit) = permit else {
                for url in batch {
                    summary.tally(&skipped(url));
                }
                continue;
            };

            let pipeline = Arc::clone(&self.pipeline);
            let health = Arc::clone(&health);
            let task_batch = batch.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                if health.cancel.is_cancelled() {
                    return task_batch.into_iter().map(skipped).collect::<Vec<_>>();
                }
                let reports = pipeline.process_batch(&task_batch).await;
                health.observe(&reports);
                reports
            });

            handles.push((batch, handle));
        }

        for (batch, handle) in handles {
            match handle.await {
                Ok(reports) => {
                    for report in &reports {
                        summary.tally(report);
                    }
                }
                Err(e) => {
                    error!(batch = ?batch, "Worker task panicked: {e}");
                    for url in batch {
                        let reason = format!("worker task panicked: {e}");
                        if let Err(log_err) = self
                            .pipeline
                            .failures()
                            .record(&url, &format!("{}: {reason}", FailureKind::TaskPanicked))
                            .await
                        {
                            error!(url = %url, "Failed to write error log: {log_err:#}");
                        }
                        summary.tally(&UrlReport {
                            url,
                            outcome: UrlOutcome::Failed {
                                kind: FailureKind::TaskPanicked,
                                reason,
                            },
                        });
                    }
                }
            }
        }

        if summary.skipped > 0 {
            warn!(skipped = summary.skipped, "Some URLs were not attempted; rerun to retry them");
        }
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            with_warnings = summary.with_warnings,
            "Run complete"
        );

        summary
    }
}

fn skipped(url: String) -> UrlReport {
    UrlReport {
        url,
        outcome: UrlOutcome::Skipped,
    }
}
