//! Shared-key ingestion through the Log Analytics HTTP Data Collector API.
//!
//! Each request is signed with `HMAC-SHA256(base64_decode(key), string_to_sign)`
//! where the string to sign is
//!
//! ```text
//! POST\n{content length}\napplication/json\nx-ms-date:{RFC 1123 date}\n/api/logs
//! ```

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use log::{debug, info};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::config::join_url;
use crate::error::{Error, Result};

const DATA_COLLECTOR_API_VERSION: &str = "2016-04-01";
const RESOURCE: &str = "/api/logs";
const CONTENT_TYPE: &str = "application/json";
/// The Data Collector API refuses posts above 30 MiB.
pub const MAX_PAYLOAD_BYTES: usize = 30 * 1024 * 1024;
const MAX_LOG_TYPE_LEN: usize = 100;

/// Name of the custom log table; Log Analytics appends `_CL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogType(String);

impl LogType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for LogType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > MAX_LOG_TYPE_LEN {
            return Err(Error::config(format!(
                "log type must be 1 to {MAX_LOG_TYPE_LEN} characters, got {}",
                s.len()
            )));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::config(format!(
                "log type may only contain letters, digits and underscores: {s}"
            )));
        }
        Ok(LogType(s.to_string()))
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A structured event in the shape the custom log table receives.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogRecord {
    pub timestamp: String,
    pub level: String,
    pub message_template: String,
    pub message: String,
    pub properties: Map<String, Value>,
}

impl LogRecord {
    /// Builds an `Information` record, rendering `{Name}` and `{@Name}` holes
    /// in `template` from `properties`.
    pub fn information(template: impl Into<String>, properties: Map<String, Value>) -> Self {
        LogRecord::at(Utc::now(), "Information", template, properties)
    }

    pub fn at(
        timestamp: DateTime<Utc>,
        level: impl Into<String>,
        template: impl Into<String>,
        properties: Map<String, Value>,
    ) -> Self {
        let message_template = template.into();
        LogRecord {
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            level: level.into(),
            message: render_template(&message_template, &properties),
            message_template,
            properties,
        }
    }
}

/// Substitutes `{Name}` / `{@Name}` holes; unknown holes are left as written.
fn render_template(template: &str, properties: &Map<String, Value>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            rendered.push_str(&rest[open..]);
            return rendered;
        };
        let hole = &after[..close];
        let name = hole.trim_start_matches(['@', '$']);
        match properties.get(name) {
            Some(Value::String(s)) if !hole.starts_with('@') => rendered.push_str(s),
            Some(value) => rendered.push_str(&value.to_string()),
            None => {
                rendered.push('{');
                rendered.push_str(hole);
                rendered.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    rendered.push_str(rest);
    rendered
}

/// Posts records to a workspace with its shared key.
#[derive(Clone)]
pub struct LogIngestionClient {
    workspace_id: String,
    key: Vec<u8>,
    endpoint: String,
    time_generated_field: Option<String>,
    http: Client,
}

impl fmt::Debug for LogIngestionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogIngestionClient")
            .field("workspace_id", &self.workspace_id)
            .field("endpoint", &self.endpoint)
            .field("time_generated_field", &self.time_generated_field)
            .finish_non_exhaustive()
    }
}

impl LogIngestionClient {
    /// `shared_key` is the base64 primary or secondary workspace key.
    pub fn new(workspace_id: impl Into<String>, shared_key: &str, http: Client) -> Result<Self> {
        let workspace_id = workspace_id.into();
        let key = STANDARD
            .decode(shared_key.trim())
            .map_err(|e| Error::config(format!("workspace key is not valid base64: {e}")))?;
        Ok(LogIngestionClient {
            endpoint: format!("https://{workspace_id}.ods.opinsights.azure.com"),
            workspace_id,
            key,
            time_generated_field: None,
            http,
        })
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint;
        }
        self
    }

    /// Field whose value Log Analytics should use as `TimeGenerated`.
    pub fn with_time_generated_field(mut self, field: Option<String>) -> Self {
        self.time_generated_field = field;
        self
    }

    /// The `Authorization` header value for a body of `content_length` bytes sent at `date`.
    pub fn signature(&self, date: &str, content_length: usize) -> Result<String> {
        let string_to_sign =
            format!("POST\n{content_length}\n{CONTENT_TYPE}\nx-ms-date:{date}\n{RESOURCE}");
        let mut mac = <Hmac<Sha256>>::new_from_slice(&self.key)
            .map_err(|e| Error::config(format!("unusable workspace key: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let hash = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{}", self.workspace_id, hash))
    }

    pub async fn send<T: Serialize>(&self, log_type: &LogType, records: &[T]) -> Result<()> {
        if records.is_empty() {
            debug!("No records to send to {}", log_type);
            return Ok(());
        }

        let body = serde_json::to_vec(records)?;
        if body.len() > MAX_PAYLOAD_BYTES {
            return Err(Error::PayloadTooLarge {
                size: body.len(),
                limit: MAX_PAYLOAD_BYTES,
            });
        }

        let date = rfc1123(Utc::now());
        let authorization = self.signature(&date, body.len())?;
        let url = join_url(&self.endpoint, RESOURCE);

        let mut request = self
            .http
            .post(&url)
            .query(&[("api-version", DATA_COLLECTOR_API_VERSION)])
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header("Log-Type", log_type.as_str())
            .header("x-ms-date", &date);
        if let Some(field) = &self.time_generated_field {
            request = request.header("time-generated-field", field);
        }

        debug!("POST {} ({} bytes, {} records)", url, body.len(), records.len());
        let response = request.body(body).send().await?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        info!("Sent {} records to {}_CL", records.len(), log_type);
        Ok(())
    }
}

/// `x-ms-date` format, e.g. `Mon, 01 Jan 2024 00:00:00 GMT`.
pub fn rfc1123(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
