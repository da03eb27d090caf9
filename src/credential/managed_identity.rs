use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::Client;
use serde_json::Value;

use super::{redact, AccessToken, TokenCredential};
use crate::config::DEFAULT_IMDS_ENDPOINT;
use crate::error::{parse_error_body, Error, Result};

const IMDS_API_VERSION: &str = "2019-08-01";
const NAME: &str = "ManagedIdentityCredential";

/// Requests tokens from the Azure instance metadata service (IMDS).
#[derive(Debug, Clone)]
pub struct ManagedIdentityCredential {
    http: Client,
    endpoint: String,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub fn new(http: Client) -> Self {
        ManagedIdentityCredential {
            http,
            endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
            client_id: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Selects a user-assigned identity instead of the system-assigned one.
    pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let scope = match scopes {
            [scope] => *scope,
            _ => {
                return Err(Error::Credential {
                    credential: NAME,
                    message: format!("exactly one scope is supported, got {}", scopes.len()),
                })
            }
        };
        let resource = scope.trim_end_matches("/.default");

        let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        debug!("Requesting managed identity token for {}", resource);
        let response = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|e| Error::Credential {
                credential: NAME,
                message: format!("metadata endpoint unreachable: {e}"),
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let (code, message) = parse_error_body(&body);
            return Err(Error::Credential {
                credential: NAME,
                message: format!("{status} {code}: {message}"),
            });
        }

        let token_body: Value = serde_json::from_str(&body)?;
        let access_token = token_body["access_token"]
            .as_str()
            .ok_or_else(|| Error::unexpected("IMDS response has no access_token"))?;
        let expires_on = parse_expires_on(&token_body["expires_on"])?;

        debug!("Access Token: {}", redact(access_token));
        Ok(AccessToken::new(access_token, expires_on))
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

/// IMDS reports `expires_on` as epoch seconds, usually encoded as a string.
fn parse_expires_on(value: &Value) -> Result<DateTime<Utc>> {
    let seconds = match value {
        Value::String(raw) => raw.trim().parse::<i64>().ok(),
        Value::Number(number) => number.as_i64(),
        _ => None,
    }
    .ok_or_else(|| Error::unexpected(format!("invalid expires_on: {value}")))?;
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| Error::unexpected(format!("expires_on out of range: {seconds}")))
}
