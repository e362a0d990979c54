// Integration tests: HTTP endpoints over the in-memory store

mod common;

use std::sync::Arc;

use axum_test::TestServer;
use common::{ReportLine, memory_service};
use kunlun::routes;

fn test_server() -> TestServer {
    let (_, service) = memory_service();
    let app = routes::app(Arc::new(service), 60);
    TestServer::new(app)
}

async fn post_report(server: &TestServer, line: &ReportLine) -> axum_test::TestResponse {
    server
        .post("/status")
        .form(&[("values", line.line())])
        .await
}

#[tokio::test]
async fn test_liveness_endpoint() {
    let server = test_server();
    let response = server.get("/status").await;
    response.assert_status_ok();
    response.assert_text("kunlun");
}

#[tokio::test]
async fn test_version_endpoint() {
    let server = test_server();
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("kunlun"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_ingest_then_read_back() {
    let server = test_server();

    let first = post_report(
        &server,
        &ReportLine::new("m-1", 50).set("default_interface_net_rx_bytes", 100),
    )
    .await;
    first.assert_status_ok();
    first.assert_json(&serde_json::json!({ "ok": 1 }));

    let second = post_report(
        &server,
        &ReportLine::new("m-1", 60).set("default_interface_net_rx_bytes", 400),
    )
    .await;
    second.assert_json(&serde_json::json!({ "ok": 2 }));

    let latest: serde_json::Value = server.get("/status/latest").await.json();
    assert_eq!(latest[0]["client_id"], 1);
    assert_eq!(latest[0]["timestamp"], 60);
    assert_eq!(latest[0]["machine_id"], "m-1");
    assert_eq!(latest[0]["hostname"], "host-m-1");

    let seconds: serde_json::Value = server.get("/status/seconds?client_id=1").await.json();
    assert_eq!(seconds[0]["default_interface_net_rx_bytes"], 300);
    assert_eq!(seconds[0]["counter_reset"], false);

    let minutes: serde_json::Value = server
        .get("/status/minutes?client_id=1&limit=5")
        .await
        .json();
    assert_eq!(minutes.as_array().map(Vec::len), Some(1));
    assert_eq!(minutes[0]["timestamp"], 60);
}

#[tokio::test]
async fn test_history_endpoint_downsamples() {
    let server = test_server();
    for ts in (0..=200).map(|i| i * 10) {
        post_report(&server, &ReportLine::new("m-1", ts).set("reads_completed", ts))
            .await
            .assert_status_ok();
    }

    let body: serde_json::Value = server
        .get("/status/history?client_id=1&tier=seconds&fields=reads_completed,load_1min&points=20")
        .await
        .json();
    assert_eq!(body["tier"], "seconds");
    assert_eq!(body["sampling"], "index_stride");
    assert_eq!(body["source_rows"], 200);
    let points = body["points"].as_array().unwrap();
    assert_eq!(points.len(), 20);
    assert_eq!(points[0].as_object().map(|o| o.len()), Some(3));
    assert_eq!(points[0]["reads_completed"], 10);
}

#[tokio::test]
async fn test_bad_reports_are_400() {
    let server = test_server();

    let short = post_report(&server, &ReportLine::new("m-1", 10).truncated()).await;
    short.assert_status_bad_request();
    let body: serde_json::Value = short.json();
    assert_eq!(body["error"], "required fields 37, received 36");

    let unaligned = post_report(&server, &ReportLine::new("m-1", 11)).await;
    unaligned.assert_status_bad_request();

    let latest: serde_json::Value = server.get("/status/latest").await.json();
    assert_eq!(latest, serde_json::json!([]));
}

#[tokio::test]
async fn test_query_errors() {
    let server = test_server();
    post_report(&server, &ReportLine::new("m-1", 10))
        .await
        .assert_status_ok();

    server
        .get("/status/seconds?client_id=42")
        .await
        .assert_status_not_found();
    server
        .get("/status/weeks?client_id=1")
        .await
        .assert_status_not_found();
    server
        .get("/status/history?client_id=1&fields=nope")
        .await
        .assert_status_bad_request();
    server
        .get("/status/history?client_id=1&window=-5")
        .await
        .assert_status_bad_request();
}
