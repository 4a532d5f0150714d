//! JSON bridge clients for the social network and the token contract.
//!
//! Both bridges are small HTTP services run next to the engine; the
//! contract bridge forwards `submit_mint` to the contract's
//! `sendRequest(giftCode)` entrypoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use sowama_types::models::MatchCriteria;

use super::{
    BlockchainProvider, LookbackWindow, PostLookup, ProviderError, SocialCredentials,
    SocialVerificationProvider, TxStatus, WalletHandle,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Shared request plumbing for both bridges.
#[derive(Clone)]
struct Bridge {
    name: &'static str,
    base_url: String,
    client: Client,
}

impl Bridge {
    fn new(name: &'static str, base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sowama-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(response).await
    }

    /// GETs `base_url/segment/...`. Each segment is percent-encoded, so a
    /// reference cannot change the route.
    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ProviderError> {
        let url = self.url(segments)?;
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(response).await
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let invalid =
            || ProviderError::Unavailable(format!("{} has an invalid base URL", self.name));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, ProviderError> {
        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!(
                "{} rejected the request ({}): {}",
                self.name, status, body
            )));
        }
        if !status.is_success() {
            warn!("{} returned {}", self.name, status);
            return Err(ProviderError::Unavailable(format!("{} ({})", self.name, status)));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| {
                ProviderError::Unavailable(format!("{} sent a malformed reply: {}", self.name, e))
            })
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.name.to_string())
        } else {
            warn!("{} request failed: {}", self.name, e);
            ProviderError::Unavailable(self.name.to_string())
        }
    }
}

pub struct HttpSocialProvider {
    bridge: Bridge,
}

impl HttpSocialProvider {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        Self {
            bridge: Bridge::new("social bridge", base_url, timeout),
        }
    }
}

#[derive(serde::Deserialize)]
struct AccountReply {
    account_id: String,
}

#[async_trait]
impl SocialVerificationProvider for HttpSocialProvider {
    async fn authenticate(&self, credentials: &SocialCredentials) -> Result<String, ProviderError> {
        let reply: AccountReply = self.bridge.post("/authenticate", credentials).await?;
        Ok(reply.account_id)
    }

    async fn find_qualifying_post(
        &self,
        account_id: &str,
        window: &LookbackWindow,
        criteria: &MatchCriteria,
    ) -> Result<PostLookup, ProviderError> {
        let body = json!({
            "account_id": account_id,
            "since": window.since,
            "until": window.until,
            "criteria": criteria,
        });
        self.bridge.post("/posts/search", &body).await
    }
}

pub struct HttpChainProvider {
    bridge: Bridge,
}

impl HttpChainProvider {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        Self {
            bridge: Bridge::new("blockchain bridge", base_url, timeout),
        }
    }
}

#[derive(serde::Deserialize)]
struct MintReply {
    tx_reference: String,
}

#[async_trait]
impl BlockchainProvider for HttpChainProvider {
    async fn initialize_wallet(&self, user_id: &str) -> Result<WalletHandle, ProviderError> {
        self.bridge.post("/wallets", &json!({ "user_id": user_id })).await
    }

    async fn submit_mint(
        &self,
        gift_code: &str,
        wallet_address: &str,
    ) -> Result<String, ProviderError> {
        let body = json!({ "gift_code": gift_code, "wallet_address": wallet_address });
        let reply: MintReply = self.bridge.post("/mints", &body).await?;
        Ok(reply.tx_reference)
    }

    async fn transaction_status(&self, tx_reference: &str) -> Result<TxStatus, ProviderError> {
        self.bridge.get(&["transactions", tx_reference]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let provider = HttpChainProvider::new("http://127.0.0.1:9000/");
        assert_eq!(provider.bridge.base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn path_segments_are_escaped() {
        let provider = HttpChainProvider::new("http://127.0.0.1:9000/bridge/");
        let url = provider.bridge.url(&["transactions", "0x/ab?c#d"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9000/bridge/transactions/0x%2Fab%3Fc%23d"
        );

        let plain = HttpChainProvider::new("http://127.0.0.1:9000");
        let url = plain.bridge.url(&["transactions", "0xtx0001"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/transactions/0xtx0001");
    }

    #[tokio::test]
    async fn unreachable_bridge_is_unavailable() {
        // Port 9 (discard) is closed on test hosts
        let provider =
            HttpSocialProvider::with_timeout("http://127.0.0.1:9", Duration::from_secs(2));
        let err = provider
            .authenticate(&SocialCredentials {
                handle: "ana".into(),
                access_token: "t".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Unavailable(_) | ProviderError::Timeout(_)
        ));
    }
}
