//! Client for Azure Log Analytics workspaces.
//!
//! A service principal certificate is downloaded from Key Vault (managed
//! identity first, then the default credential chain), and is then used to
//! resolve the workspace through Resource Manager, query its logs, and ship
//! structured records to it with the workspace shared key.

pub mod certificate;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod ingest;
pub mod keyvault;
pub mod query;
pub mod workspace;

pub use certificate::Certificate;
pub use client::AzureLogAnalyticsClient;
pub use config::{AzureLogAnalyticsConfig, Endpoints};
pub use error::{Error, Result};
