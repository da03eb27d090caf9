use std::error::Error;

use log::{debug, info};
use log_analytics_client::{AzureLogAnalyticsClient, AzureLogAnalyticsConfig};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    dotenv::dotenv().ok();

    let query = std::env::var("LOG_QUERY").unwrap_or_else(|_| "Heartbeat | take 10".to_string());
    let log_type = std::env::var("LOG_TYPE").unwrap_or_else(|_| "ClientDiagnostics".to_string());

    let config = AzureLogAnalyticsConfig::from_env()?;
    let mut client = AzureLogAnalyticsClient::new(config)?;

    // Certificate from Key Vault, managed identity first
    let certificate = client.initialize().await?;
    info!("Certificate Thumbprint: {}", certificate.thumbprint_hex());

    let workspace_id = client.get_workspace_id().await?;
    info!("Workspace ID: {}", workspace_id);

    let workspace_key = client.get_workspace_key().await?;
    debug!("Workspace key retrieved ({} chars)", workspace_key.len());

    let result = client.fetch_logs(&workspace_id, &query).await?;
    info!(
        "Query returned {} rows",
        result.tables.iter().map(|t| t.rows.len()).sum::<usize>()
    );

    let log_data = json!({
        "Source": "log-analytics-client",
        "Query": query,
        "Host": std::env::var("HOSTNAME").unwrap_or_default(),
    });
    client
        .write_logs(&workspace_id, &workspace_key, &log_type, &log_data)
        .await?;

    Ok(())
}
