use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{redact, AccessToken, TokenCredential};
use crate::certificate::Certificate;
use crate::config::{join_url, DEFAULT_AUTHORITY_HOST};
use crate::error::{parse_error_body, Error, Result};

const NAME: &str = "ClientCertificateCredential";
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const ASSERTION_LIFETIME_MINUTES: i64 = 10;
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Claims of the client assertion presented to the v2.0 token endpoint.
///
/// # Fields
///
/// * `aud` - The token endpoint the assertion is meant for.
/// * `iss` / `sub` - Both the application (client) ID.
/// * `jti` - A unique identifier so the assertion cannot be replayed.
/// * `nbf` / `exp` - Validity window in epoch seconds.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub aud: String,
    pub iss: String,
    pub sub: String,
    pub jti: String,
    pub nbf: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Authenticates a service principal with a certificate, caching tokens per scope set.
#[derive(Debug)]
pub struct ClientCertificateCredential {
    http: Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    certificate: Certificate,
    cache: Mutex<HashMap<String, AccessToken>>,
}

impl ClientCertificateCredential {
    pub fn new(
        http: Client,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        certificate: Certificate,
    ) -> Self {
        ClientCertificateCredential {
            http,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            certificate,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into();
        self
    }

    fn token_endpoint(&self) -> String {
        join_url(
            &self.authority_host,
            &format!("{}/oauth2/v2.0/token", self.tenant_id),
        )
    }

    /// Signs a fresh RS256 client assertion with the certificate's private key.
    pub(crate) fn client_assertion(&self) -> Result<String> {
        let now = Utc::now();
        let claims = AssertionClaims {
            aud: self.token_endpoint(),
            iss: self.client_id.clone(),
            sub: self.client_id.clone(),
            jti: Uuid::new_v4().to_string(),
            nbf: now.timestamp(),
            exp: (now + Duration::minutes(ASSERTION_LIFETIME_MINUTES)).timestamp(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.x5t = Some(self.certificate.thumbprint().to_string());

        let key = EncodingKey::from_rsa_pem(self.certificate.private_key_pem().as_bytes())?;
        Ok(encode(&header, &claims, &key)?)
    }

    async fn request_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let assertion = self.client_assertion()?;
        let scope = scopes.join(" ");
        let form = [
            ("client_id", self.client_id.as_str()),
            ("scope", scope.as_str()),
            ("grant_type", "client_credentials"),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
        ];

        debug!("Requesting token for {} from {}", scope, self.token_endpoint());
        let response = self
            .http
            .post(self.token_endpoint())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let (code, message) = parse_error_body(&body);
            return Err(Error::Credential {
                credential: NAME,
                message: format!("{status} {code}: {message}"),
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        debug!("Access Token: {}", redact(&token.access_token));
        Ok(AccessToken::new(
            token.access_token,
            Utc::now() + Duration::seconds(token.expires_in),
        ))
    }
}

#[async_trait]
impl TokenCredential for ClientCertificateCredential {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let key = scopes.join(" ");
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.get(&key) {
            if !token.is_expired_within(Duration::minutes(REFRESH_MARGIN_MINUTES)) {
                return Ok(token.clone());
            }
        }

        let token = self.request_token(scopes).await?;
        info!(
            "{} acquired a token for {} (thumbprint {})",
            NAME,
            key,
            self.certificate.thumbprint_hex()
        );
        cache.insert(key, token.clone());
        Ok(token)
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
