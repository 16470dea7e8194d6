//! Integration tests for the capture store.

use chrono::{TimeZone, Utc};
use wayback_snapshot_archiver::db::{
    count_captures, export_capture_html, get_capture, get_captures_by_timestamp,
    get_captures_by_url, insert_capture, CaptureRecord, CaptureStore, Database,
};
use tempfile::TempDir;

const COLLECTION: &str = "wayback_home_captures";

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path, COLLECTION)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn record(url: &str, body: &[u8]) -> CaptureRecord {
    CaptureRecord::new(
        url,
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        body.to_vec(),
        "--window-size=1280,720",
    )
}

#[tokio::test]
async fn test_insert_and_get_capture() {
    let (db, _temp_dir) = setup_db().await;
    let url = "http://x.org/web/20200101000000/http://example.com";

    let id = insert_capture(db.pool(), COLLECTION, &record(url, b"<html>ok</html>"))
        .await
        .expect("Failed to insert capture");
    assert!(id > 0);

    let stored = get_capture(db.pool(), COLLECTION, id)
        .await
        .expect("Failed to get capture")
        .expect("Capture not found");

    assert_eq!(stored.id, id);
    assert_eq!(stored.content, b"<html>ok</html>");
    assert_eq!(stored.timestamp, "2020-01-01T00:00:00Z");
    assert_eq!(stored.device, "--window-size=1280,720");
    assert_eq!(stored.source_url.as_deref(), Some(url));
    assert!(!stored.is_advertising_modified);
    assert!(stored.advertising_id_when_modified.is_none());
    assert!(!stored.created_at.is_empty());
}

#[tokio::test]
async fn test_content_bytes_are_not_reencoded() {
    let (db, _temp_dir) = setup_db().await;
    let body = "<html>caf\u{e9} \u{1f4f0}</html>".as_bytes();

    let id = db
        .insert_capture(&record("http://x.org/web/20200101000000/a", body))
        .await
        .unwrap();

    assert_eq!(db.fetch_content(id).await.unwrap().unwrap(), body);
    assert!(db.fetch_content(id + 1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_count_and_lookup_by_url() {
    let (db, _temp_dir) = setup_db().await;
    let url = "http://x.org/web/20200101000000/http://example.com";

    assert_eq!(count_captures(db.pool(), COLLECTION).await.unwrap(), 0);

    db.insert_capture(&record(url, b"one")).await.unwrap();
    db.insert_capture(&record(url, b"two")).await.unwrap();
    db.insert_capture(&record("http://x.org/web/20200101000000/other", b"x"))
        .await
        .unwrap();

    assert_eq!(count_captures(db.pool(), COLLECTION).await.unwrap(), 3);

    let by_url = get_captures_by_url(db.pool(), COLLECTION, url).await.unwrap();
    assert_eq!(by_url.len(), 2);
    assert_eq!(by_url[0].content, b"one");
    assert_eq!(by_url[1].content, b"two");
}

#[tokio::test]
async fn test_reopen_keeps_data_and_schema() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.sqlite");

    let db = Database::new(&path, COLLECTION).await.unwrap();
    db.insert_capture(&record("http://x.org/web/20200101000000/a", b"a"))
        .await
        .unwrap();
    db.close().await;

    // Migrations are idempotent on an existing file.
    let db = Database::new(&path, COLLECTION).await.unwrap();
    assert_eq!(count_captures(db.pool(), COLLECTION).await.unwrap(), 1);
}

#[tokio::test]
async fn test_collections_are_independent() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.sqlite");

    let home = Database::new(&path, "home_captures").await.unwrap();
    let news = Database::new(&path, "news_captures").await.unwrap();

    home.insert_capture(&record("http://x.org/web/20200101000000/a", b"a"))
        .await
        .unwrap();

    assert_eq!(count_captures(home.pool(), "home_captures").await.unwrap(), 1);
    assert_eq!(count_captures(news.pool(), "news_captures").await.unwrap(), 0);
}

#[tokio::test]
async fn test_unwritable_location_fails_at_startup() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing-dir").join("test.sqlite");

    assert!(Database::new(&path, COLLECTION).await.is_err());
}

#[tokio::test]
async fn test_lookup_by_timestamp_and_export() {
    let (db, temp_dir) = setup_db().await;

    let mut later = record("http://x.org/web/20210101000000/a", b"later");
    later.captured_at = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
    db.insert_capture(&record("http://x.org/web/20200101000000/a", b"<html>first</html>"))
        .await
        .unwrap();
    db.insert_capture(&later).await.unwrap();

    let found = get_captures_by_timestamp(
        db.pool(),
        COLLECTION,
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].content, b"<html>first</html>");

    let none = get_captures_by_timestamp(
        db.pool(),
        COLLECTION,
        Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
    )
    .await
    .unwrap();
    assert!(none.is_empty());

    let out = temp_dir.path().join("export").join("first.html");
    export_capture_html(&found[0], &out).await.unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), b"<html>first</html>");
}
