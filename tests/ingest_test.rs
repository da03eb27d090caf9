use httpmock::prelude::*;
use log_analytics_client::ingest::{LogIngestionClient, LogRecord, LogType};
use log_analytics_client::Error;
use serde_json::{json, Map};

const WORKSPACE: &str = "6c1e9f3a-0f5d-4d55-9a3e-1c2b3d4e5f60";
const KEY: &str = "c2hhcmVkLWtleS1mb3ItdGVzdHM=";

fn client(server: &MockServer) -> LogIngestionClient {
    LogIngestionClient::new(WORKSPACE, KEY, reqwest::Client::new())
        .unwrap()
        .with_endpoint(Some(server.base_url()))
}

#[tokio::test]
async fn posts_signed_batch() {
    let server = MockServer::start_async().await;
    let ingest = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/logs")
                .query_param("api-version", "2016-04-01")
                .header("Log-Type", "AppEvents")
                .header("content-type", "application/json")
                .header_exists("x-ms-date")
                .header_exists("authorization")
                .json_body(json!([
                    {"Computer": "vm-01", "Count": 4},
                    {"Computer": "vm-02", "Count": 1}
                ]));
            then.status(200);
        })
        .await;

    let records = vec![
        json!({"Computer": "vm-01", "Count": 4}),
        json!({"Computer": "vm-02", "Count": 1}),
    ];
    let log_type: LogType = "AppEvents".parse().unwrap();
    client(&server).send(&log_type, &records).await.unwrap();

    ingest.assert_async().await;
}

#[tokio::test]
async fn sends_time_generated_field() {
    let server = MockServer::start_async().await;
    let ingest = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/logs")
                .header("time-generated-field", "Timestamp");
            then.status(200);
        })
        .await;

    let record = LogRecord::information("Started {Service}", {
        let mut properties = Map::new();
        properties.insert("Service".to_string(), json!("ingest"));
        properties
    });
    let log_type: LogType = "ServiceEvents".parse().unwrap();
    client(&server)
        .with_time_generated_field(Some("Timestamp".to_string()))
        .send(&log_type, &[record])
        .await
        .unwrap();

    ingest.assert_async().await;
}

#[tokio::test]
async fn empty_batches_are_not_sent() {
    let server = MockServer::start_async().await;
    let ingest = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/logs");
            then.status(200);
        })
        .await;

    let log_type: LogType = "AppEvents".parse().unwrap();
    let records: Vec<serde_json::Value> = Vec::new();
    client(&server).send(&log_type, &records).await.unwrap();

    ingest.assert_hits_async(0).await;
}

#[tokio::test]
async fn rejected_signature_is_a_service_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/logs");
            then.status(403).json_body(json!({
                "Error": "InvalidAuthorization",
                "Message": "An invalid scheme was specified in the Authorization header"
            }));
        })
        .await;

    let log_type: LogType = "AppEvents".parse().unwrap();
    let err = client(&server)
        .send(&log_type, &[json!({"a": 1})])
        .await
        .unwrap_err();
    match err {
        Error::Service { status, code, .. } => {
            assert_eq!(status, 403);
            assert_eq!(code, "InvalidAuthorization");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn oversized_payloads_are_rejected_locally() {
    let server = MockServer::start_async().await;
    let ingest = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/logs");
            then.status(200);
        })
        .await;

    let big = "x".repeat(31 * 1024 * 1024);
    let log_type: LogType = "AppEvents".parse().unwrap();
    let err = client(&server)
        .send(&log_type, &[json!({ "blob": big })])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PayloadTooLarge { .. }));
    ingest.assert_hits_async(0).await;
}
