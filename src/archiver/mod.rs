//! Archiving a worklist: invoke the external tool, reconcile its artifacts,
//! and fan the work out over a bounded worker pool.

pub mod pipeline;
pub mod reconcile;
pub mod retry;
pub mod scheduler;
pub mod tool;

pub use pipeline::{Pipeline, UrlOutcome, UrlReport};
pub use reconcile::{ReconcileOptions, ReconcileOutcome, ReconcileWarning, Reconciler};
pub use retry::RetryPolicy;
pub use scheduler::{RunSummary, Scheduler};
pub use tool::{ArchiveInvoker, ArchiveTool, ArtifactSlot, ToolConfig};
