use std::sync::Arc;

use chrono::Duration;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{join_url, DEFAULT_LOG_QUERY_ENDPOINT};
use crate::credential::{default_scope, TokenCredential};
use crate::error::{Error, Result};

/// A window of the given length that ends at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTimeRange {
    duration: Duration,
}

impl QueryTimeRange {
    pub fn new(duration: Duration) -> Self {
        QueryTimeRange { duration }
    }

    pub fn last_days(days: u32) -> Self {
        QueryTimeRange::new(Duration::days(i64::from(days)))
    }

    /// ISO 8601 duration understood by the `timespan` parameter.
    pub fn to_iso8601(&self) -> String {
        let seconds = self.duration.num_seconds();
        if seconds > 0 && seconds % 86_400 == 0 {
            format!("P{}D", seconds / 86_400)
        } else {
            format!("PT{seconds}S")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogsColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogsTable {
    pub name: String,
    pub columns: Vec<LogsColumn>,
    pub rows: Vec<Vec<Value>>,
}

impl LogsTable {
    /// One line per row, cells separated by a single space.
    pub fn render_rows(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.iter().map(render_cell).collect::<Vec<_>>().join(" "))
            .collect()
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogsQueryResult {
    #[serde(default)]
    pub tables: Vec<LogsTable>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    tables: Vec<LogsTable>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    timespan: String,
}

/// Runs KQL queries against a workspace through the Log Analytics query API.
#[derive(Debug, Clone)]
pub struct LogsQueryClient {
    endpoint: String,
    credential: Arc<dyn TokenCredential>,
    http: Client,
}

impl LogsQueryClient {
    pub fn new(credential: Arc<dyn TokenCredential>, http: Client) -> Self {
        LogsQueryClient {
            endpoint: DEFAULT_LOG_QUERY_ENDPOINT.to_string(),
            credential,
            http,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn query_workspace(
        &self,
        workspace_id: &str,
        query: &str,
        range: QueryTimeRange,
    ) -> Result<LogsQueryResult> {
        let scope = default_scope(&self.endpoint);
        let token = self.credential.get_token(&[scope.as_str()]).await?;

        let url = join_url(&self.endpoint, &format!("v1/workspaces/{workspace_id}/query"));
        let body = QueryBody {
            query,
            timespan: range.to_iso8601(),
        };
        debug!("POST {} timespan={}", url, body.timespan);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token.token)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }

        let response: QueryResponse = response.json().await?;
        if let Some(error) = &response.error {
            if response.tables.is_empty() {
                return Err(Error::Service {
                    status: 200,
                    code: error["code"].as_str().unwrap_or("Unknown").to_string(),
                    message: error["message"].as_str().unwrap_or_default().to_string(),
                });
            }
            warn!("Query returned partial results: {}", error);
        }
        Ok(LogsQueryResult {
            tables: response.tables,
        })
    }
}
