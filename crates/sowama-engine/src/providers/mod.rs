//! External collaborators consulted by the claim workflow.
//!
//! The engine only sees these traits. The server wires in the HTTP
//! bridge clients from [`http`]; tests use the scripted doubles in
//! [`crate::testing`].

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sowama_types::models::MatchCriteria;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} is unavailable")]
    Unavailable(String),
    #[error("{0}")]
    Rejected(String),
    #[error("{0} timed out")]
    Timeout(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialCredentials {
    pub handle: String,
    pub access_token: String,
}

/// Time range a qualifying post must fall in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookbackWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostLookup {
    pub found: bool,
    #[serde(default)]
    pub post_reference: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
}

impl PostLookup {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn found(post_reference: impl Into<String>) -> Self {
        Self {
            found: true,
            post_reference: Some(post_reference.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletHandle {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed(Option<String>),
}

#[async_trait]
pub trait SocialVerificationProvider: Send + Sync {
    /// Links a social account and returns its stable id.
    async fn authenticate(&self, credentials: &SocialCredentials) -> Result<String, ProviderError>;

    async fn find_qualifying_post(
        &self,
        account_id: &str,
        window: &LookbackWindow,
        criteria: &MatchCriteria,
    ) -> Result<PostLookup, ProviderError>;
}

#[async_trait]
pub trait BlockchainProvider: Send + Sync {
    async fn initialize_wallet(&self, user_id: &str) -> Result<WalletHandle, ProviderError>;

    /// Calls the contract's mint entrypoint with the gift code. Returns the
    /// transaction reference.
    async fn submit_mint(
        &self,
        gift_code: &str,
        wallet_address: &str,
    ) -> Result<String, ProviderError>;

    async fn transaction_status(&self, tx_reference: &str) -> Result<TxStatus, ProviderError>;
}

/// Stand-in used when no bridge URL is configured.
pub struct Unconfigured(pub &'static str);

#[async_trait]
impl SocialVerificationProvider for Unconfigured {
    async fn authenticate(
        &self,
        _credentials: &SocialCredentials,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable(self.0.to_string()))
    }

    async fn find_qualifying_post(
        &self,
        _account_id: &str,
        _window: &LookbackWindow,
        _criteria: &MatchCriteria,
    ) -> Result<PostLookup, ProviderError> {
        Err(ProviderError::Unavailable(self.0.to_string()))
    }
}

#[async_trait]
impl BlockchainProvider for Unconfigured {
    async fn initialize_wallet(&self, _user_id: &str) -> Result<WalletHandle, ProviderError> {
        Err(ProviderError::Unavailable(self.0.to_string()))
    }

    async fn submit_mint(
        &self,
        _gift_code: &str,
        _wallet_address: &str,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable(self.0.to_string()))
    }

    async fn transaction_status(&self, _tx_reference: &str) -> Result<TxStatus, ProviderError> {
        Err(ProviderError::Unavailable(self.0.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_status_wire_format() {
        let json = serde_json::to_value(TxStatus::Failed(Some("reverted".into()))).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "reverted");

        let pending: TxStatus = serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert_eq!(pending, TxStatus::Pending);
    }

    #[tokio::test]
    async fn unconfigured_is_unavailable() {
        let chain = Unconfigured("blockchain bridge");
        let err = chain.submit_mint("GIFT_1_ab", "0xabc").await.unwrap_err();
        assert_eq!(err, ProviderError::Unavailable("blockchain bridge".into()));
    }
}
