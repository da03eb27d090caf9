//! Token credentials used against Azure AD protected APIs.
//!
//! Three sources are provided: the instance metadata service
//! ([`ManagedIdentityCredential`]), the `azure_identity` default chain
//! ([`DefaultCredentialChain`]) and a service principal certificate
//! ([`ClientCertificateCredential`]).

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;

mod client_certificate;
mod default_chain;
mod managed_identity;

pub use client_certificate::ClientCertificateCredential;
pub use default_chain::DefaultCredentialChain;
pub use managed_identity::ManagedIdentityCredential;

/// A bearer token and the instant it stops being valid.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        AccessToken {
            token: token.into(),
            expires_on,
        }
    }

    /// True when the token expires before `now + margin`.
    pub fn is_expired_within(&self, margin: Duration) -> bool {
        self.expires_on <= Utc::now() + margin
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &redact(&self.token))
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Something that can hand out bearer tokens for a set of scopes.
#[async_trait]
pub trait TokenCredential: Send + Sync + fmt::Debug {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken>;

    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;
}

/// Keeps the first few characters of a secret for log correlation.
pub(crate) fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(6).collect();
    format!("{visible}…({} chars)", secret.chars().count())
}

/// Scope for an AAD v2 resource, e.g. `https://vault.azure.net/.default`.
pub(crate) fn default_scope(resource: &str) -> String {
    format!("{}/.default", resource.trim_end_matches('/'))
}
