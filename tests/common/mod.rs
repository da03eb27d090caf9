#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log_analytics_client::credential::{AccessToken, TokenCredential};
use log_analytics_client::{AzureLogAnalyticsConfig, Certificate, Error, Result};

pub const BUNDLE: &str = include_str!("../fixtures/client_bundle.pem");
pub const X5T: &str = "80IA-LN2EzRpoA7lxTFdokaUg-U";
pub const TENANT_ID: &str = "00000000-0000-0000-0000-0000000000aa";
pub const CLIENT_ID: &str = "00000000-0000-0000-0000-0000000000bb";

pub fn certificate() -> Certificate {
    Certificate::from_pem_bundle("log-reader", X5T, BUNDLE).unwrap()
}

/// Hands out a fixed token and remembers the scopes it was asked for.
#[derive(Debug, Default)]
pub struct StaticCredential {
    token: String,
    pub scopes: Mutex<Vec<String>>,
}

impl StaticCredential {
    pub fn new(token: &str) -> Arc<Self> {
        Arc::new(StaticCredential {
            token: token.to_string(),
            scopes: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TokenCredential for StaticCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        self.scopes
            .lock()
            .unwrap()
            .extend(scopes.iter().map(|s| s.to_string()));
        Ok(AccessToken::new(&self.token, Utc::now() + Duration::hours(1)))
    }

    fn name(&self) -> &'static str {
        "StaticCredential"
    }
}

#[derive(Debug)]
pub struct FailingCredential;

#[async_trait]
impl TokenCredential for FailingCredential {
    async fn get_token(&self, _scopes: &[&str]) -> Result<AccessToken> {
        Err(Error::Credential {
            credential: "FailingCredential",
            message: "no identity available".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "FailingCredential"
    }
}

/// A config whose every endpoint points at `base_url`.
pub fn config(base_url: &str) -> AzureLogAnalyticsConfig {
    let vars: HashMap<&str, String> = [
        ("KEY_VAULT_URL", base_url.to_string()),
        ("CERTIFICATE_NAME", "log-reader".to_string()),
        ("SUBSCRIPTION_ID", "sub-1".to_string()),
        ("RESOURCE_GROUP_NAME", "monitoring-rg".to_string()),
        ("WORKSPACE_NAME", "contoso-logs".to_string()),
        ("TENANT_ID", TENANT_ID.to_string()),
        ("CLIENT_ID", CLIENT_ID.to_string()),
        ("LOG_QUERY_DAYS", "7".to_string()),
        ("AZURE_AUTHORITY_HOST", base_url.to_string()),
        ("AZURE_RESOURCE_MANAGER_URL", base_url.to_string()),
        ("LOG_ANALYTICS_QUERY_URL", base_url.to_string()),
        ("LOG_ANALYTICS_INGESTION_URL", base_url.to_string()),
        ("IMDS_ENDPOINT", format!("{base_url}/metadata/identity/oauth2/token")),
    ]
    .into_iter()
    .collect();
    AzureLogAnalyticsConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

pub const WORKSPACE_PATH: &str =
    "/subscriptions/sub-1/resourceGroups/monitoring-rg/providers/Microsoft.OperationalInsights/workspaces/contoso-logs";
