use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;

use crate::config::{join_url, DEFAULT_RESOURCE_MANAGER};
use crate::credential::{default_scope, redact, TokenCredential};
use crate::error::{Error, Result};

const WORKSPACE_API_VERSION: &str = "2021-12-01-preview";
const SHARED_KEYS_API_VERSION: &str = "2020-08-01";
const PROVIDER: &str = "Microsoft.OperationalInsights";

/// ARM identifier of a Log Analytics workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceResourceId {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub workspace_name: String,
}

impl WorkspaceResourceId {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group_name: impl Into<String>,
        workspace_name: impl Into<String>,
    ) -> Self {
        WorkspaceResourceId {
            subscription_id: subscription_id.into(),
            resource_group_name: resource_group_name.into(),
            workspace_name: workspace_name.into(),
        }
    }
}

impl fmt::Display for WorkspaceResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}/workspaces/{}",
            self.subscription_id, self.resource_group_name, PROVIDER, self.workspace_name
        )
    }
}

impl FromStr for WorkspaceResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let segments: Vec<&str> = s.trim_matches('/').split('/').collect();
        let invalid = || Error::config(format!("not a workspace resource ID: {s}"));
        match segments.as_slice() {
            [subscriptions, subscription_id, resource_groups, resource_group_name, providers, provider, workspaces, workspace_name]
                if subscriptions.eq_ignore_ascii_case("subscriptions")
                    && resource_groups.eq_ignore_ascii_case("resourceGroups")
                    && providers.eq_ignore_ascii_case("providers")
                    && provider.eq_ignore_ascii_case(PROVIDER)
                    && workspaces.eq_ignore_ascii_case("workspaces")
                    && !subscription_id.is_empty()
                    && !resource_group_name.is_empty()
                    && !workspace_name.is_empty() =>
            {
                Ok(WorkspaceResourceId::new(
                    *subscription_id,
                    *resource_group_name,
                    *workspace_name,
                ))
            }
            _ => Err(invalid()),
        }
    }
}

/// A workspace as described by Resource Manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub location: String,
    /// The workspace ID used by the query and ingestion APIs.
    pub customer_id: String,
}

/// Primary and secondary keys for shared-key ingestion.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedKeys {
    pub primary_shared_key: Option<String>,
    pub secondary_shared_key: Option<String>,
}

impl fmt::Debug for SharedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKeys")
            .field("primary_shared_key", &self.primary_shared_key.as_deref().map(redact))
            .field(
                "secondary_shared_key",
                &self.secondary_shared_key.as_deref().map(redact),
            )
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct WorkspaceResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    properties: serde_json::Value,
}

/// Minimal Resource Manager client for Log Analytics workspaces.
#[derive(Debug, Clone)]
pub struct ArmClient {
    endpoint: String,
    credential: Arc<dyn TokenCredential>,
    http: Client,
}

impl ArmClient {
    pub fn new(credential: Arc<dyn TokenCredential>, http: Client) -> Self {
        ArmClient {
            endpoint: DEFAULT_RESOURCE_MANAGER.to_string(),
            credential,
            http,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn bearer(&self) -> Result<String> {
        let scope = default_scope(&self.endpoint);
        Ok(self.credential.get_token(&[scope.as_str()]).await?.token)
    }

    pub async fn get_workspace(&self, id: &WorkspaceResourceId) -> Result<Workspace> {
        let url = join_url(&self.endpoint, &id.to_string());
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .query(&[("api-version", WORKSPACE_API_VERSION)])
            .bearer_auth(self.bearer().await?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }

        let body: WorkspaceResponse = response.json().await?;
        let customer_id = body.properties["customerId"]
            .as_str()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::unexpected(format!("workspace {id} has no customerId")))?
            .to_string();
        info!("Resolved workspace {} to {}", id.workspace_name, customer_id);
        Ok(Workspace {
            id: body.id,
            name: body.name,
            location: body.location,
            customer_id,
        })
    }

    pub async fn get_shared_keys(&self, id: &WorkspaceResourceId) -> Result<SharedKeys> {
        let url = join_url(&self.endpoint, &format!("{id}/sharedKeys"));
        debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .query(&[("api-version", SHARED_KEYS_API_VERSION)])
            .bearer_auth(self.bearer().await?)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        let keys: SharedKeys = response.json().await?;
        debug!("Shared keys: {:?}", keys);
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_arm_identifier() {
        let id = WorkspaceResourceId::new("sub-1", "monitoring-rg", "contoso-logs");
        assert_eq!(
            id.to_string(),
            "/subscriptions/sub-1/resourceGroups/monitoring-rg/providers/Microsoft.OperationalInsights/workspaces/contoso-logs"
        );
    }

    #[test]
    fn parses_identifier_case_insensitively() {
        let id: WorkspaceResourceId =
            "/SUBSCRIPTIONS/sub-1/resourcegroups/monitoring-rg/providers/microsoft.operationalinsights/Workspaces/contoso-logs"
                .parse()
                .unwrap();
        assert_eq!(id, WorkspaceResourceId::new("sub-1", "monitoring-rg", "contoso-logs"));
    }

    #[test]
    fn rejects_other_resource_types() {
        let parsed = "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/acct"
            .parse::<WorkspaceResourceId>();
        assert!(parsed.is_err());
        assert!("/subscriptions/sub-1".parse::<WorkspaceResourceId>().is_err());
    }

    #[test]
    fn shared_keys_debug_is_redacted() {
        let keys = SharedKeys {
            primary_shared_key: Some("c2VjcmV0LXByaW1hcnkta2V5".to_string()),
            secondary_shared_key: None,
        };
        assert!(!format!("{keys:?}").contains("c2VjcmV0LXByaW1hcnkta2V5"));
    }
}
