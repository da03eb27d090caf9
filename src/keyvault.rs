use std::sync::Arc;

use log::{debug, error, info, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::certificate::Certificate;
use crate::config::{join_url, AzureLogAnalyticsConfig};
use crate::credential::{
    DefaultCredentialChain, ManagedIdentityCredential, TokenCredential,
};
use crate::error::{Error, Result};

pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";
const KEY_VAULT_API_VERSION: &str = "7.4";

/// The subset of a Key Vault certificate bundle needed to fetch its secret.
#[derive(Debug, Deserialize)]
struct CertificateBundle {
    x5t: String,
    sid: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretBundle {
    value: String,
    content_type: Option<String>,
}

/// Downloads certificates, private key included, from a Key Vault.
#[derive(Debug, Clone)]
pub struct CertificateClient {
    vault_url: String,
    credential: Arc<dyn TokenCredential>,
    http: Client,
}

impl CertificateClient {
    pub fn new(
        vault_url: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
        http: Client,
    ) -> Self {
        CertificateClient {
            vault_url: vault_url.into(),
            credential,
            http,
        }
    }

    /// Fetches the certificate's thumbprint and then its backing secret,
    /// which carries the private key.
    pub async fn download_certificate(&self, name: &str) -> Result<Certificate> {
        let token = self.credential.get_token(&[KEY_VAULT_SCOPE]).await?;

        let certificate_url = join_url(&self.vault_url, &format!("certificates/{name}"));
        debug!("Fetching certificate from {}", certificate_url);
        let response = self
            .http
            .get(&certificate_url)
            .query(&[("api-version", KEY_VAULT_API_VERSION)])
            .bearer_auth(&token.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        let bundle: CertificateBundle = response.json().await?;

        debug!("Fetching certificate secret from {}", bundle.sid);
        let response = self
            .http
            .get(&bundle.sid)
            .query(&[("api-version", KEY_VAULT_API_VERSION)])
            .bearer_auth(&token.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::from_response(response).await);
        }
        let secret: SecretBundle = response.json().await?;

        let certificate =
            Certificate::from_secret(name, bundle.x5t, secret.content_type.as_deref(), &secret.value)?;
        info!(
            "Downloaded certificate {} using {} (thumbprint {})",
            name,
            self.credential.name(),
            certificate.thumbprint_hex()
        );
        Ok(certificate)
    }
}

/// Tries the managed identity first and falls back to the default credential chain.
pub async fn download_with_fallback(
    config: &AzureLogAnalyticsConfig,
    http: &Client,
) -> Result<Certificate> {
    let managed_identity = ManagedIdentityCredential::new(http.clone())
        .with_endpoint(config.endpoints.imds.clone())
        .with_client_id(config.managed_identity_client_id.clone());
    download_first_available(config, http, Arc::new(managed_identity), || {
        Ok(Arc::new(DefaultCredentialChain::new()?) as Arc<dyn TokenCredential>)
    })
    .await
}

/// Downloads the configured certificate with `primary`, building and trying
/// the `fallback` credential only if the first attempt fails.
pub async fn download_first_available<F>(
    config: &AzureLogAnalyticsConfig,
    http: &Client,
    primary: Arc<dyn TokenCredential>,
    fallback: F,
) -> Result<Certificate>
where
    F: FnOnce() -> Result<Arc<dyn TokenCredential>>,
{
    let primary_name = primary.name();
    let client = CertificateClient::new(config.key_vault_url.clone(), primary, http.clone());
    let err = match client.download_certificate(&config.certificate_name).await {
        Ok(certificate) => return Ok(certificate),
        Err(err) => err,
    };

    let fallback = fallback().map_err(|e| {
        error!("{} failed: {}, and no fallback credential is available: {}", primary_name, err, e);
        e
    })?;
    warn!(
        "{} failed: {}, trying {}.",
        primary_name,
        err,
        fallback.name()
    );

    let fallback_name = fallback.name();
    let client = CertificateClient::new(config.key_vault_url.clone(), fallback, http.clone());
    client
        .download_certificate(&config.certificate_name)
        .await
        .map_err(|err| {
            error!("{} failed: {}", fallback_name, err);
            err
        })
}
