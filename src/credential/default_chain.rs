use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use log::debug;

use super::{AccessToken, TokenCredential};
use crate::error::{Error, Result};

const NAME: &str = "DefaultCredentialChain";

/// The `azure_identity` credential chain: environment, workload identity,
/// managed identity and the Azure CLI, selected via `AZURE_CREDENTIAL_KIND`.
#[derive(Clone)]
pub struct DefaultCredentialChain {
    inner: Arc<dyn azure_core::auth::TokenCredential>,
}

impl DefaultCredentialChain {
    pub fn new() -> Result<Self> {
        let inner = azure_identity::create_credential()?;
        Ok(DefaultCredentialChain { inner })
    }

    /// Wraps an already constructed SDK credential.
    pub fn from_sdk(inner: Arc<dyn azure_core::auth::TokenCredential>) -> Self {
        DefaultCredentialChain { inner }
    }
}

impl fmt::Debug for DefaultCredentialChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultCredentialChain").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenCredential for DefaultCredentialChain {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        debug!("Requesting token from the default credential chain for {:?}", scopes);
        let token = self.inner.get_token(scopes).await?;
        let expires_on = DateTime::from_timestamp(token.expires_on.unix_timestamp(), 0)
            .ok_or_else(|| Error::Credential {
                credential: NAME,
                message: "token expiry out of range".to_string(),
            })?;
        Ok(AccessToken::new(token.token.secret(), expires_on))
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
