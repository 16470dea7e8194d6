use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations for `collection`.
///
/// Versions are tracked per collection so several capture collections can
/// share one database file.
pub async fn run(pool: &SqlitePool, collection: &str) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool, collection).await?;

    if current_version < 1 {
        debug!(collection, "Running migration v1");
        run_migration_v1(pool, collection).await?;
        set_schema_version(pool, collection, 1).await?;
    }

    if current_version < 2 {
        debug!(collection, "Running migration v2");
        run_migration_v2(pool, collection).await?;
        set_schema_version(pool, collection, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            collection TEXT PRIMARY KEY,
            version INTEGER NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool, collection: &str) -> Result<i32> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT version FROM _schema_version WHERE collection = ?")
            .bind(collection)
            .fetch_optional(pool)
            .await
            .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, collection: &str, version: i32) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO _schema_version (collection, version) VALUES (?, ?)
        ON CONFLICT(collection) DO UPDATE SET version = excluded.version
        ",
    )
    .bind(collection)
    .bind(version)
    .execute(pool)
    .await
    .context("Failed to set schema version")?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool, collection: &str) -> Result<()> {
    debug!(collection, "Running migration v1: creating capture collection");

    // `collection` is validated as [A-Za-z0-9_]+ by the config layer.
    sqlx::query(&format!(
        r"
        CREATE TABLE IF NOT EXISTS {collection} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device TEXT NOT NULL,
            content BLOB NOT NULL,
            timestamp TEXT NOT NULL,
            is_advertising_modified INTEGER NOT NULL DEFAULT 0,
            advertising_id_when_modified TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "
    ))
    .execute(pool)
    .await
    .context("Failed to create capture collection")?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{collection}_timestamp ON {collection}(timestamp)"
    ))
    .execute(pool)
    .await
    .context("Failed to create timestamp index")?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool, collection: &str) -> Result<()> {
    debug!(collection, "Running migration v2: recording source url");

    sqlx::query(&format!("ALTER TABLE {collection} ADD COLUMN source_url TEXT"))
        .execute(pool)
        .await
        .context("Failed to add source_url column")?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{collection}_source_url ON {collection}(source_url)"
    ))
    .execute(pool)
    .await
    .context("Failed to create source_url index")?;

    Ok(())
}
