mod common;

use httpmock::prelude::*;
use log_analytics_client::{AzureLogAnalyticsClient, Error};
use serde_json::json;

use common::WORKSPACE_PATH;

const CUSTOMER_ID: &str = "6c1e9f3a-0f5d-4d55-9a3e-1c2b3d4e5f60";

#[tokio::test]
async fn operations_require_a_certificate() {
    let client = AzureLogAnalyticsClient::new(common::config("http://127.0.0.1:1")).unwrap();
    assert!(client.certificate().is_none());
    assert!(matches!(
        client.get_workspace_id().await.unwrap_err(),
        Error::NotInitialized
    ));
    assert!(matches!(
        client.fetch_logs(CUSTOMER_ID, "Heartbeat").await.unwrap_err(),
        Error::NotInitialized
    ));
}

#[tokio::test]
async fn resolves_queries_and_writes_with_certificate() {
    let server = MockServer::start_async().await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/{}/oauth2/v2.0/token", common::TENANT_ID))
                .x_www_form_urlencoded_tuple("client_id", common::CLIENT_ID);
            then.status(200).json_body(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "sp-token"
            }));
        })
        .await;
    let workspace = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(WORKSPACE_PATH)
                .header("authorization", "Bearer sp-token");
            then.status(200).json_body(json!({
                "id": WORKSPACE_PATH,
                "name": "contoso-logs",
                "location": "westeurope",
                "properties": { "customerId": CUSTOMER_ID }
            }));
        })
        .await;
    let keys = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("{WORKSPACE_PATH}/sharedKeys"))
                .header("authorization", "Bearer sp-token");
            then.status(200).json_body(json!({
                "primarySharedKey": "c2hhcmVkLWtleS1mb3ItdGVzdHM=",
                "secondarySharedKey": "b3RoZXIta2V5"
            }));
        })
        .await;
    let query = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/v1/workspaces/{CUSTOMER_ID}/query"))
                .header("authorization", "Bearer sp-token")
                .json_body(json!({ "query": "Heartbeat | take 1", "timespan": "P7D" }));
            then.status(200).json_body(json!({
                "tables": [{
                    "name": "PrimaryResult",
                    "columns": [{"name": "Computer", "type": "string"}],
                    "rows": [["vm-01"]]
                }]
            }));
        })
        .await;
    let ingest = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/logs")
                .header("Log-Type", "ClientDiagnostics")
                .body_contains("Log message with multiple properties")
                .body_contains("\"LogData\":{\"Source\":\"tests\"}");
            then.status(200);
        })
        .await;

    let client = AzureLogAnalyticsClient::new(common::config(&server.base_url()))
        .unwrap()
        .with_certificate(common::certificate());

    let workspace_id = client.get_workspace_id().await.unwrap();
    assert_eq!(workspace_id, CUSTOMER_ID);

    let workspace_key = client.get_workspace_key().await.unwrap();
    assert_eq!(workspace_key, "c2hhcmVkLWtleS1mb3ItdGVzdHM=");

    let result = client
        .fetch_logs(&workspace_id, "Heartbeat | take 1")
        .await
        .unwrap();
    assert_eq!(result.tables[0].render_rows(), vec!["vm-01"]);

    client
        .write_logs(
            &workspace_id,
            &workspace_key,
            "ClientDiagnostics",
            &json!({ "Source": "tests" }),
        )
        .await
        .unwrap();

    // ARM and the query API share the mock host, so one token serves both
    token.assert_hits_async(1).await;
    workspace.assert_async().await;
    keys.assert_async().await;
    query.assert_async().await;
    ingest.assert_async().await;
}

#[tokio::test]
async fn invalid_log_type_fails_before_sending() {
    let client = AzureLogAnalyticsClient::new(common::config("http://127.0.0.1:1"))
        .unwrap()
        .with_certificate(common::certificate());
    let err = client
        .write_logs(CUSTOMER_ID, "c2hhcmVk", "bad-type!", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}
