//! Deterministic collaborator doubles for tests and local runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use sowama_types::models::MatchCriteria;

use crate::providers::{
    BlockchainProvider, LookbackWindow, PostLookup, ProviderError, SocialCredentials,
    SocialVerificationProvider, TxStatus, WalletHandle,
};

/// Social provider that replays queued lookup results. An empty queue
/// answers "not found".
#[derive(Default)]
pub struct ScriptedSocial {
    lookups: Mutex<VecDeque<Result<PostLookup, ProviderError>>>,
    fail_auth: AtomicBool,
    delay: Mutex<Option<Duration>>,
    searches: AtomicUsize,
}

impl ScriptedSocial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, lookup: Result<PostLookup, ProviderError>) {
        if let Ok(mut q) = self.lookups.lock() {
            q.push_back(lookup);
        }
    }

    pub fn fail_auth(&self, fail: bool) {
        self.fail_auth.store(fail, Ordering::SeqCst);
    }

    /// Makes every search sleep first, to exercise timeouts.
    pub fn delay_searches(&self, by: Duration) {
        if let Ok(mut d) = self.delay.lock() {
            *d = Some(by);
        }
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SocialVerificationProvider for ScriptedSocial {
    async fn authenticate(&self, credentials: &SocialCredentials) -> Result<String, ProviderError> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected("invalid social credentials".into()));
        }
        Ok(format!("acct-{}", credentials.handle))
    }

    async fn find_qualifying_post(
        &self,
        _account_id: &str,
        _window: &LookbackWindow,
        _criteria: &MatchCriteria,
    ) -> Result<PostLookup, ProviderError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.lookups
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Ok(PostLookup::not_found()))
    }
}

/// Chain double that mints each gift code at most once and reports
/// scripted transaction statuses (confirmed unless told otherwise).
#[derive(Default)]
pub struct ScriptedChain {
    submitted: Mutex<Vec<(String, String)>>,
    seen_codes: Mutex<HashSet<String>>,
    statuses: Mutex<HashMap<String, TxStatus>>,
    default_status: Mutex<Option<TxStatus>>,
    fail_submit: AtomicBool,
    fail_wallet: AtomicBool,
}

impl ScriptedChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status reported for transactions without a specific entry.
    pub fn set_default_status(&self, status: TxStatus) {
        if let Ok(mut s) = self.default_status.lock() {
            *s = Some(status);
        }
    }

    pub fn set_status(&self, tx_reference: &str, status: TxStatus) {
        if let Ok(mut s) = self.statuses.lock() {
            s.insert(tx_reference.to_string(), status);
        }
    }

    pub fn fail_submit(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_wallet(&self, fail: bool) {
        self.fail_wallet.store(fail, Ordering::SeqCst);
    }

    /// `(gift_code, wallet_address)` for every accepted mint.
    pub fn submissions(&self) -> Vec<(String, String)> {
        self.submitted.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BlockchainProvider for ScriptedChain {
    async fn initialize_wallet(&self, user_id: &str) -> Result<WalletHandle, ProviderError> {
        if self.fail_wallet.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("wallet service".into()));
        }
        Ok(WalletHandle {
            address: format!("0x{}", hex::encode(user_id.as_bytes())),
        })
    }

    async fn submit_mint(
        &self,
        gift_code: &str,
        wallet_address: &str,
    ) -> Result<String, ProviderError> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("blockchain bridge".into()));
        }
        let mut seen = self
            .seen_codes
            .lock()
            .map_err(|_| ProviderError::Unavailable("blockchain bridge".into()))?;
        if !seen.insert(gift_code.to_string()) {
            return Err(ProviderError::Rejected(format!("gift code {} already used", gift_code)));
        }
        drop(seen);

        let mut submitted = self
            .submitted
            .lock()
            .map_err(|_| ProviderError::Unavailable("blockchain bridge".into()))?;
        submitted.push((gift_code.to_string(), wallet_address.to_string()));
        Ok(format!("0xtx{:04}", submitted.len()))
    }

    async fn transaction_status(&self, tx_reference: &str) -> Result<TxStatus, ProviderError> {
        let specific = self
            .statuses
            .lock()
            .ok()
            .and_then(|s| s.get(tx_reference).cloned());
        let fallback = self.default_status.lock().ok().and_then(|s| s.clone());
        Ok(specific.or(fallback).unwrap_or(TxStatus::Confirmed))
    }
}
