//! Integration tests for Wayback CDX discovery using a mock HTTP server.

use serde_json::json;
use tempfile::TempDir;
use wayback_snapshot_archiver::ledger::load_worklist;
use wayback_snapshot_archiver::wayback::{write_worklist, CdxClient, CdxQuery};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cdx_body() -> serde_json::Value {
    json!([
        ["timestamp", "original"],
        ["20190301120000", "http://example.com/"],
        ["20200615080000", "http://example.com/"],
        ["20210101000000"]
    ])
}

#[tokio::test]
async fn test_snapshots_newest_first() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cdx/search/cdx"))
        .and(query_param("url", "example.com"))
        .and(query_param("output", "json"))
        .and(query_param("collapse", "digest"))
        .and(query_param("fl", "timestamp,original"))
        .and(query_param("filter", "statuscode:200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cdx_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = CdxClient::new(format!("{}/cdx/search/cdx", server.uri())).unwrap();
    let urls = client
        .snapshots("example.com", &CdxQuery::default())
        .await
        .unwrap();

    assert_eq!(
        urls,
        vec![
            "http://web.archive.org/web/20200615080000if_/http://example.com/",
            "http://web.archive.org/web/20190301120000if_/http://example.com/",
        ]
    );
}

#[tokio::test]
async fn test_snapshots_passes_date_bounds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cdx"))
        .and(query_param("from", "2019"))
        .and(query_param("to", "2020"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cdx_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = CdxClient::new(format!("{}/cdx", server.uri())).unwrap();
    let query = CdxQuery {
        from: Some("2019".to_string()),
        to: Some("2020".to_string()),
    };
    let urls = client.snapshots("example.com", &query).await.unwrap();

    assert_eq!(urls.len(), 2);
}

#[tokio::test]
async fn test_snapshots_empty_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cdx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = CdxClient::new(format!("{}/cdx", server.uri())).unwrap();
    let urls = client
        .snapshots("nothing.example", &CdxQuery::default())
        .await
        .unwrap();

    assert!(urls.is_empty());
}

#[tokio::test]
async fn test_snapshots_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cdx"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = CdxClient::new(format!("{}/cdx", server.uri())).unwrap();
    let err = client
        .snapshots("example.com", &CdxQuery::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_discovered_worklist_round_trips_through_loader() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cdx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cdx_body()))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let worklist = temp_dir.path().join("worklist.txt");

    let client = CdxClient::new(format!("{}/cdx", server.uri())).unwrap();
    let urls = client
        .snapshots("example.com", &CdxQuery::default())
        .await
        .unwrap();
    write_worklist(&worklist, &urls).await.unwrap();

    assert_eq!(load_worklist(&worklist).await.unwrap(), urls);
}
