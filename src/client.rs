use std::sync::Arc;

use log::{debug, info};
use reqwest::Client;
use serde::Serialize;
use serde_json::Map;

use crate::certificate::Certificate;
use crate::config::AzureLogAnalyticsConfig;
use crate::credential::{ClientCertificateCredential, TokenCredential};
use crate::error::{Error, Result};
use crate::ingest::{LogIngestionClient, LogRecord, LogType};
use crate::keyvault;
use crate::query::{LogsQueryClient, LogsQueryResult, QueryTimeRange};
use crate::workspace::{ArmClient, Workspace, WorkspaceResourceId};

pub const LOG_DATA_TEMPLATE: &str = "Log message with multiple properties: {@LogData}";

/// Entry point tying the certificate, the workspace and the query/ingestion APIs together.
#[derive(Debug)]
pub struct AzureLogAnalyticsClient {
    config: AzureLogAnalyticsConfig,
    http: Client,
    certificate: Option<Certificate>,
    credential: Option<Arc<dyn TokenCredential>>,
}

impl AzureLogAnalyticsClient {
    pub fn new(config: AzureLogAnalyticsConfig) -> Result<Self> {
        config.validate()?;
        let http = config.http_client()?;
        Ok(AzureLogAnalyticsClient {
            config,
            http,
            certificate: None,
            credential: None,
        })
    }

    pub fn config(&self) -> &AzureLogAnalyticsConfig {
        &self.config
    }

    /// Downloads the service principal certificate from Key Vault.
    pub async fn initialize(&mut self) -> Result<&Certificate> {
        let certificate = keyvault::download_with_fallback(&self.config, &self.http).await?;
        Ok(self.install(certificate))
    }

    /// Uses an already obtained certificate instead of downloading one.
    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.install(certificate);
        self
    }

    fn install(&mut self, certificate: Certificate) -> &Certificate {
        let credential = ClientCertificateCredential::new(
            self.http.clone(),
            self.config.tenant_id.clone(),
            self.config.client_id.clone(),
            certificate.clone(),
        )
        .with_authority_host(self.config.endpoints.authority_host.clone());
        self.credential = Some(Arc::new(credential));
        self.certificate.insert(certificate)
    }

    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    pub fn workspace_resource_id(&self) -> WorkspaceResourceId {
        WorkspaceResourceId::new(
            self.config.subscription_id.clone(),
            self.config.resource_group_name.clone(),
            self.config.workspace_name.clone(),
        )
    }

    fn certificate_credential(&self) -> Result<Arc<dyn TokenCredential>> {
        self.credential.clone().ok_or(Error::NotInitialized)
    }

    fn arm_client(&self) -> Result<ArmClient> {
        Ok(ArmClient::new(self.certificate_credential()?, self.http.clone())
            .with_endpoint(self.config.endpoints.resource_manager.clone()))
    }

    pub async fn get_workspace(&self) -> Result<Workspace> {
        self.arm_client()?
            .get_workspace(&self.workspace_resource_id())
            .await
    }

    /// The workspace (customer) ID used by the query and ingestion APIs.
    pub async fn get_workspace_id(&self) -> Result<String> {
        Ok(self.get_workspace().await?.customer_id)
    }

    /// The primary shared key of the workspace.
    pub async fn get_workspace_key(&self) -> Result<String> {
        let keys = self
            .arm_client()?
            .get_shared_keys(&self.workspace_resource_id())
            .await?;
        keys.primary_shared_key
            .ok_or_else(|| Error::unexpected("workspace has no primary shared key"))
    }

    /// Runs `query` over the configured number of days, logging every row.
    pub async fn fetch_logs(&self, workspace_id: &str, query: &str) -> Result<LogsQueryResult> {
        let client = LogsQueryClient::new(self.certificate_credential()?, self.http.clone())
            .with_endpoint(self.config.endpoints.log_query.clone());
        let result = client
            .query_workspace(
                workspace_id,
                query,
                QueryTimeRange::last_days(self.config.log_query_days),
            )
            .await?;

        for table in &result.tables {
            debug!("Table {} ({} rows)", table.name, table.rows.len());
            for line in table.render_rows() {
                info!("{}", line);
            }
        }
        Ok(result)
    }

    /// Echoes `log_data` to the console log and ships it to the `log_type` custom table.
    pub async fn write_logs<T: Serialize>(
        &self,
        workspace_id: &str,
        workspace_key: &str,
        log_type: &str,
        log_data: &T,
    ) -> Result<()> {
        let log_type: LogType = log_type.parse()?;
        let mut properties = Map::new();
        properties.insert("LogData".to_string(), serde_json::to_value(log_data)?);
        let record = LogRecord::information(LOG_DATA_TEMPLATE, properties);
        info!("{}", record.message);

        let client = LogIngestionClient::new(workspace_id, workspace_key, self.http.clone())?
            .with_endpoint(self.config.endpoints.ingestion.clone());
        client.send(&log_type, &[record]).await
    }
}
