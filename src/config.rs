use std::time::Duration;

use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_RESOURCE_MANAGER: &str = "https://management.azure.com";
pub const DEFAULT_LOG_QUERY_ENDPOINT: &str = "https://api.loganalytics.io";
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Service endpoints used by the client. Overridable for sovereign clouds and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub authority_host: String,
    pub resource_manager: String,
    pub log_query: String,
    pub imds: String,
    /// When unset the Data Collector endpoint is derived from the workspace ID.
    pub ingestion: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            resource_manager: DEFAULT_RESOURCE_MANAGER.to_string(),
            log_query: DEFAULT_LOG_QUERY_ENDPOINT.to_string(),
            imds: DEFAULT_IMDS_ENDPOINT.to_string(),
            ingestion: None,
        }
    }
}

fn default_log_query_days() -> u32 {
    1
}

fn default_http_timeout_secs() -> u64 {
    30
}

/// Everything needed to locate the certificate, the workspace and the
/// service principal the certificate belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureLogAnalyticsConfig {
    pub key_vault_url: String,
    pub certificate_name: String,
    pub subscription_id: String,
    pub resource_group_name: String,
    pub workspace_name: String,
    pub tenant_id: String,
    pub client_id: String,
    #[serde(default = "default_log_query_days")]
    pub log_query_days: u32,
    #[serde(default)]
    pub managed_identity_client_id: Option<String>,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl AzureLogAnalyticsConfig {
    /// Reads the configuration from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String> {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| Error::MissingVariable(name.to_string()))
        };
        let optional = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let log_query_days = match optional("LOG_QUERY_DAYS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("LOG_QUERY_DAYS is not a number: {raw}")))?,
            None => default_log_query_days(),
        };
        let http_timeout_secs = match optional("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("HTTP_TIMEOUT_SECS is not a number: {raw}")))?,
            None => default_http_timeout_secs(),
        };

        let defaults = Endpoints::default();
        let endpoints = Endpoints {
            authority_host: optional("AZURE_AUTHORITY_HOST").unwrap_or(defaults.authority_host),
            resource_manager: optional("AZURE_RESOURCE_MANAGER_URL")
                .unwrap_or(defaults.resource_manager),
            log_query: optional("LOG_ANALYTICS_QUERY_URL").unwrap_or(defaults.log_query),
            imds: optional("IMDS_ENDPOINT").unwrap_or(defaults.imds),
            ingestion: optional("LOG_ANALYTICS_INGESTION_URL"),
        };

        let config = AzureLogAnalyticsConfig {
            key_vault_url: required("KEY_VAULT_URL")?,
            certificate_name: required("CERTIFICATE_NAME")?,
            subscription_id: required("SUBSCRIPTION_ID")?,
            resource_group_name: required("RESOURCE_GROUP_NAME")?,
            workspace_name: required("WORKSPACE_NAME")?,
            tenant_id: required("TENANT_ID")?,
            client_id: required("CLIENT_ID")?,
            log_query_days,
            managed_identity_client_id: optional("MANAGED_IDENTITY_CLIENT_ID"),
            endpoints,
            http_timeout_secs,
        };
        config.validate()?;
        debug!("Config: {:#?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let identifiers = [
            ("certificate_name", &self.certificate_name),
            ("subscription_id", &self.subscription_id),
            ("resource_group_name", &self.resource_group_name),
            ("workspace_name", &self.workspace_name),
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
        ];
        for (field, value) in identifiers {
            if value.trim().is_empty() {
                return Err(Error::config(format!("{field} must not be empty")));
            }
        }

        let mut urls = vec![
            ("key_vault_url", self.key_vault_url.as_str()),
            ("authority_host", self.endpoints.authority_host.as_str()),
            ("resource_manager", self.endpoints.resource_manager.as_str()),
            ("log_query", self.endpoints.log_query.as_str()),
            ("imds", self.endpoints.imds.as_str()),
        ];
        if let Some(ingestion) = &self.endpoints.ingestion {
            urls.push(("ingestion", ingestion.as_str()));
        }
        for (field, value) in urls {
            check_http_url(field, value)?;
        }

        if self.log_query_days == 0 {
            return Err(Error::config("log_query_days must be at least 1"));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::config("http_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    /// The HTTP client shared by every sub-client.
    pub fn http_client(&self) -> Result<Client> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs))
            .build()?)
    }
}

fn check_http_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| Error::config(format!("{field} is not a valid URL ({value}): {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(Error::config(format!(
            "{field} must use http or https, got {scheme}"
        ))),
    }
}

/// Joins a base endpoint and a path without doubling or dropping slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
