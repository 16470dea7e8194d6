use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

use super::models::{CaptureRecord, StoredCapture};

// `collection` arguments are validated as [A-Za-z0-9_]+ by the config layer,
// which is what makes interpolating them into SQL acceptable.

/// Insert a capture, returning its generated ID.
pub async fn insert_capture(
    pool: &SqlitePool,
    collection: &str,
    record: &CaptureRecord,
) -> Result<i64> {
    let result = sqlx::query(&format!(
        r"
        INSERT INTO {collection}
            (device, content, timestamp, is_advertising_modified,
             advertising_id_when_modified, source_url)
        VALUES (?, ?, ?, ?, ?, ?)
        "
    ))
    .bind(&record.device_profile)
    .bind(&record.content)
    .bind(
        record
            .captured_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    )
    .bind(record.advertising_modified)
    .bind(&record.advertising_modified_id)
    .bind(&record.url)
    .execute(pool)
    .await
    .context("Failed to insert capture")?;

    Ok(result.last_insert_rowid())
}

/// Get a capture by ID.
pub async fn get_capture(
    pool: &SqlitePool,
    collection: &str,
    id: i64,
) -> Result<Option<StoredCapture>> {
    sqlx::query_as(&format!("SELECT * FROM {collection} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch capture")
}

/// Get every capture stored for a capture URL, oldest first.
pub async fn get_captures_by_url(
    pool: &SqlitePool,
    collection: &str,
    url: &str,
) -> Result<Vec<StoredCapture>> {
    sqlx::query_as(&format!(
        "SELECT * FROM {collection} WHERE source_url = ? ORDER BY id"
    ))
    .bind(url)
    .fetch_all(pool)
    .await
    .context("Failed to fetch captures by url")
}

/// Get every capture taken at `captured_at`, oldest insert first.
pub async fn get_captures_by_timestamp(
    pool: &SqlitePool,
    collection: &str,
    captured_at: DateTime<Utc>,
) -> Result<Vec<StoredCapture>> {
    sqlx::query_as(&format!(
        "SELECT * FROM {collection} WHERE timestamp = ? ORDER BY id"
    ))
    .bind(captured_at.to_rfc3339_opts(SecondsFormat::Secs, true))
    .fetch_all(pool)
    .await
    .context("Failed to fetch captures by timestamp")
}

/// Total number of captures in the collection.
pub async fn count_captures(pool: &SqlitePool, collection: &str) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {collection}"))
        .fetch_one(pool)
        .await
        .context("Failed to count captures")?;
    Ok(count)
}
