use thiserror::Error;

/// Errors raised while talking to Azure AD, Key Vault, Resource Manager,
/// or the Log Analytics query and ingestion endpoints.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Azure SDK error: {0}")]
    Azure(#[from] azure_core::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("JWT signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Environment variable {0} is not set")]
    MissingVariable(String),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{credential} could not acquire a token: {message}")]
    Credential {
        credential: &'static str,
        message: String,
    },

    #[error("Certificate error: {message}")]
    Certificate { message: String },

    #[error("Unsupported certificate content type: {0}")]
    UnsupportedCertificateFormat(String),

    #[error("Service returned {status} ({code}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },

    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Client is not initialized, call initialize() first")]
    NotInitialized,
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    pub(crate) fn unexpected(message: impl Into<String>) -> Self {
        Error::UnexpectedResponse {
            message: message.into(),
        }
    }

    /// Builds a `Service` error from a non-success response, pulling the
    /// `{"error": {"code", "message"}}` envelope shared by Azure APIs when present.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let (code, message) = parse_error_body(&body);
        Error::Service {
            status,
            code,
            message,
        }
    }
}

pub(crate) fn parse_error_body(body: &str) -> (String, String) {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return ("Unknown".to_string(), body.trim().to_string()),
    };
    let error = &value["error"];
    match error {
        serde_json::Value::Object(_) => (
            error["code"].as_str().unwrap_or("Unknown").to_string(),
            error["message"].as_str().unwrap_or_default().to_string(),
        ),
        // Ingestion and OAuth endpoints use flat `Error`/`error` + `Message`/`error_description`
        serde_json::Value::String(code) => (
            code.clone(),
            value["error_description"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        ),
        _ => (
            value["Error"].as_str().unwrap_or("Unknown").to_string(),
            value["Message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| body.trim().to_string()),
        ),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
