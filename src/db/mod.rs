mod migrations;
mod models;
mod queries;

pub use models::*;
pub use queries::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

/// Where capture records go.
///
/// The pipeline only needs insert and read-back; implementations must be safe
/// to share between workers.
#[async_trait]
pub trait CaptureStore: Send + Sync {
    /// Persist `record`, returning the generated identifier.
    async fn insert_capture(&self, record: &CaptureRecord) -> Result<i64>;

    /// Content bytes of a previously inserted capture.
    async fn fetch_content(&self, id: i64) -> Result<Option<Vec<u8>>>;
}

/// Write a stored page back out as an HTML file at `path`.
///
/// # Errors
///
/// Returns an error if the parent directory or the file cannot be written.
pub async fn export_capture_html(capture: &StoredCapture, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    tokio::fs::write(path, &capture.content)
        .await
        .with_context(|| format!("Failed to write capture {} to {}", capture.id, path.display()))?;
    info!(id = capture.id, path = %path.display(), "Capture exported");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    collection: String,
}

impl Database {
    /// Connect to the capture store, running migrations if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails, migrations fail, or the
    /// database turns out to be read-only.
    pub async fn new(path: &Path, collection: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Workers insert concurrently; writes are still serialized by SQLite.
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to capture database")?;

        let db = Self {
            pool,
            collection: collection.to_string(),
        };
        db.run_migrations().await?;
        db.verify_writable(path).await?;

        Ok(db)
    }

    async fn verify_writable(&self, path: &Path) -> Result<()> {
        // Starting a transaction requires write capability on SQLite.
        let tx = self.pool.begin().await.with_context(|| {
            format!(
                "Capture database is not writable (path: {}). Check permissions/ownership",
                path.display()
            )
        })?;

        tx.commit()
            .await
            .context("Failed to commit capture database writability check")?;
        Ok(())
    }

    async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool, &self.collection).await?;
        info!(collection = %self.collection, "Database migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CaptureStore for Database {
    async fn insert_capture(&self, record: &CaptureRecord) -> Result<i64> {
        insert_capture(&self.pool, &self.collection, record).await
    }

    async fn fetch_content(&self, id: i64) -> Result<Option<Vec<u8>>> {
        Ok(get_capture(&self.pool, &self.collection, id)
            .await?
            .map(|capture| capture.content))
    }
}
