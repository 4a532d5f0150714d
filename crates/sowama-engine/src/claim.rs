//! Tweet-verified NFT claim workflow.
//!
//! ```text
//! not_authenticated -> awaiting_post -> checking -> detected -> minting -> minted*
//!                                          |                      |
//!                                          +-> not_found*         +-> error*
//!                                          +-> error*
//! ```
//!
//! Every status change is a compare-and-set on the stored session, so
//! concurrent requests for the same user cannot both win a transition.
//! Provider calls run on spawned tasks: if the caller stops waiting, the
//! check or mint still runs to completion and lands in the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sowama_db::{Store, Transition};
use sowama_types::events::EngineEvent;
use sowama_types::models::{ClaimSession, ClaimStatus, EntryKind, MatchCriteria, NewEntry};

use crate::clock::Clock;
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::providers::{
    BlockchainProvider, LookbackWindow, PostLookup, SocialCredentials, SocialVerificationProvider,
    TxStatus,
};

/// Attempts at drawing a gift code that is not already registered.
const GIFT_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct ClaimConfig {
    /// Points credited when a mint is confirmed.
    pub nft_bonus_points: i64,
    /// How far back a qualifying post may be.
    pub lookback: chrono::Duration,
    /// Upper bound on one social lookup.
    pub check_timeout: Duration,
    pub mention_tag: String,
    /// How long a `minting` session may wait for its transaction reference
    /// before it is moved to `error`. Must exceed the chain call timeout.
    pub submit_horizon: Duration,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            nft_bonus_points: 50,
            lookback: chrono::Duration::hours(72),
            check_timeout: Duration::from_secs(60),
            mention_tag: "@SowamaAgent".to_string(),
            submit_horizon: Duration::from_secs(600),
        }
    }
}

struct Inner {
    store: Arc<dyn Store>,
    social: Arc<dyn SocialVerificationProvider>,
    chain: Arc<dyn BlockchainProvider>,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
    config: ClaimConfig,
}

#[derive(Clone)]
pub struct ClaimMachine {
    inner: Arc<Inner>,
}

impl ClaimMachine {
    pub fn new(
        store: Arc<dyn Store>,
        social: Arc<dyn SocialVerificationProvider>,
        chain: Arc<dyn BlockchainProvider>,
        clock: Arc<dyn Clock>,
        dispatcher: Dispatcher,
        config: ClaimConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                social,
                chain,
                clock,
                dispatcher,
                config,
            }),
        }
    }

    pub async fn session(&self, user_id: &str) -> Result<Option<ClaimSession>, EngineError> {
        let user_id = user_id.to_string();
        self.db(move |store| store.claim_session(&user_id)).await
    }

    /// Archived sessions, newest first.
    pub async fn history(&self, user_id: &str) -> Result<Vec<ClaimSession>, EngineError> {
        let user_id = user_id.to_string();
        self.db(move |store| store.claim_history(&user_id)).await
    }

    /// Links a social account. Allowed with no session, before linking,
    /// or after a terminal state (which starts a fresh session).
    pub async fn link_account(
        &self,
        user_id: &str,
        credentials: SocialCredentials,
    ) -> Result<ClaimSession, EngineError> {
        if credentials.handle.trim().is_empty() {
            return Err(EngineError::invalid("social handle is required"));
        }

        let current = self.session(user_id).await?;
        if let Some(s) = &current {
            if s.status != ClaimStatus::NotAuthenticated && !s.status.is_terminal() {
                return Err(EngineError::transition(s.status, "link a social account"));
            }
        }

        let auth = self.inner.social.authenticate(&credentials).await;
        let now = self.inner.clock.now();

        let mut session = match &current {
            Some(s) if s.status == ClaimStatus::NotAuthenticated => s.clone(),
            _ => ClaimSession::new(user_id, now),
        };
        session.updated_at = now;

        let failure = match auth {
            Ok(account_id) => {
                session.status = ClaimStatus::AwaitingPost;
                session.social_account_id = Some(account_id);
                session.message = None;
                None
            }
            Err(e) => {
                session.message = Some(format!("Could not link social account: {}", e));
                Some(e)
            }
        };

        if current.as_ref().is_some_and(|s| s.id == session.id) {
            self.apply(&session, ClaimStatus::NotAuthenticated).await?;
        } else {
            self.install(&session).await?;
        }

        match failure {
            Some(e) => {
                warn!("Social link failed for {}: {}", user_id, e);
                Err(e.into())
            }
            None => {
                info!("User {} linked social account", user_id);
                self.publish(&session);
                Ok(session)
            }
        }
    }

    /// Starts a `checking` cycle and waits for its outcome. From
    /// `not_found` or `error` this opens a new session with a fresh
    /// lookback window. Provider failures end in the `error` state, not
    /// in an `Err`.
    pub async fn request_verification(
        &self,
        user_id: &str,
        min_weight_kg: Option<f64>,
        location: Option<String>,
    ) -> Result<ClaimSession, EngineError> {
        if let Some(w) = min_weight_kg {
            if !w.is_finite() || w <= 0.0 {
                return Err(EngineError::invalid(format!(
                    "minimum weight must be positive, got {}",
                    w
                )));
            }
        }

        let current = self.require_session(user_id).await?;
        let now = self.inner.clock.now();

        let session = match current.status {
            ClaimStatus::AwaitingPost => {
                let mut s = current.clone();
                s.status = ClaimStatus::Checking;
                s.checking_started_at = Some(now);
                s.message = None;
                s.updated_at = now;
                self.apply(&s, ClaimStatus::AwaitingPost).await?;
                s
            }
            ClaimStatus::NotFound | ClaimStatus::Error => {
                let Some(account_id) = current.social_account_id.clone() else {
                    return Err(EngineError::transition(current.status, "request verification"));
                };
                let mut s = ClaimSession::new(user_id, now);
                s.status = ClaimStatus::Checking;
                s.social_account_id = Some(account_id);
                s.wallet_address = current.wallet_address.clone();
                s.checking_started_at = Some(now);
                self.install(&s).await?;
                s
            }
            other => return Err(EngineError::transition(other, "request verification")),
        };

        debug!("Claim {} for {} is checking", session.id, user_id);
        self.publish(&session);

        let criteria = MatchCriteria {
            mention_tag: self.inner.config.mention_tag.clone(),
            min_weight_kg,
            location,
        };
        let machine = self.clone();
        tokio::spawn(async move { machine.complete_check(session, criteria).await })
            .await
            .map_err(|e| EngineError::Storage(anyhow::anyhow!("verification task failed: {}", e)))?
    }

    async fn complete_check(
        &self,
        mut session: ClaimSession,
        criteria: MatchCriteria,
    ) -> Result<ClaimSession, EngineError> {
        let config = &self.inner.config;
        let Some(account_id) = session.social_account_id.clone() else {
            return Err(EngineError::transition(session.status, "verify without a linked account"));
        };
        let until = self.inner.clock.now();
        let window = LookbackWindow {
            since: until - config.lookback,
            until,
        };

        let lookup = tokio::time::timeout(
            config.check_timeout,
            self.inner
                .social
                .find_qualifying_post(&account_id, &window, &criteria),
        )
        .await;

        session.updated_at = self.inner.clock.now();
        let found = match lookup {
            Ok(Ok(lookup)) if satisfies(&lookup, &criteria) => Some(lookup),
            Ok(Ok(_)) => {
                session.status = ClaimStatus::NotFound;
                session.message = Some(format!(
                    "No post mentioning {} found in the last {} hours",
                    criteria.mention_tag,
                    config.lookback.num_hours()
                ));
                None
            }
            Ok(Err(e)) => {
                session.status = ClaimStatus::Error;
                session.message = Some(format!("Verification failed: {}", e));
                None
            }
            Err(_) => {
                session.status = ClaimStatus::Error;
                session.message = Some("Verification timed out".to_string());
                None
            }
        };

        match found {
            Some(lookup) => self.detect(session, lookup).await,
            None => {
                if !self.try_apply(&session, ClaimStatus::Checking).await? {
                    return self.require_session(&session.user_id).await;
                }
                info!(
                    "Claim {} for {} ended {}: {}",
                    session.id,
                    session.user_id,
                    session.status,
                    session.message.as_deref().unwrap_or("")
                );
                self.publish(&session);
                Ok(session)
            }
        }
    }

    async fn detect(
        &self,
        mut session: ClaimSession,
        lookup: PostLookup,
    ) -> Result<ClaimSession, EngineError> {
        let details: Vec<String> = lookup
            .weight_kg
            .map(|w| format!("{} kg", w))
            .into_iter()
            .chain(lookup.location.clone())
            .collect();
        session.status = ClaimStatus::Detected;
        session.tweet_reference = lookup.post_reference;
        session.message = Some(if details.is_empty() {
            "Qualifying post found".to_string()
        } else {
            format!("Qualifying post found ({})", details.join(", "))
        });

        for _ in 0..GIFT_CODE_ATTEMPTS {
            session.gift_code = Some(new_gift_code(session.updated_at));
            let s = session.clone();
            let outcome = self
                .db(move |store| store.transition_claim(&s, ClaimStatus::Checking))
                .await?;
            match outcome {
                Transition::Applied => {
                    info!(
                        "Claim {} for {} detected a qualifying post",
                        session.id, session.user_id
                    );
                    self.publish(&session);
                    return Ok(session);
                }
                Transition::Stale => return self.require_session(&session.user_id).await,
                Transition::GiftCodeTaken => debug!("Gift code collision, drawing another"),
            }
        }
        Err(EngineError::Storage(anyhow::anyhow!(
            "could not allocate a unique gift code"
        )))
    }

    /// Submits the detected session's gift code for minting. The code is
    /// marked as used before the contract is called; it is never sent twice.
    pub async fn submit_claim(
        &self,
        user_id: &str,
        wallet_address: Option<String>,
    ) -> Result<ClaimSession, EngineError> {
        let current = self.require_session(user_id).await?;
        let code = current.gift_code.clone().unwrap_or_default();
        match current.status {
            ClaimStatus::Detected => {}
            ClaimStatus::Minting | ClaimStatus::Minted => {
                return Err(EngineError::DuplicateClaim(code));
            }
            other => return Err(EngineError::transition(other, "submit a claim")),
        }
        if code.is_empty() {
            return Err(EngineError::Storage(anyhow::anyhow!(
                "detected claim {} has no gift code",
                current.id
            )));
        }

        let wallet = match wallet_address
            .filter(|w| !w.trim().is_empty())
            .or_else(|| current.wallet_address.clone())
        {
            Some(w) => w,
            None => self.inner.chain.initialize_wallet(user_id).await?.address,
        };

        let now = self.inner.clock.now();
        let mut session = current;
        session.status = ClaimStatus::Minting;
        session.wallet_address = Some(wallet.clone());
        session.message = None;
        session.updated_at = now;

        let machine = self.clone();
        tokio::spawn(async move { machine.begin_submit(session, code, wallet).await })
            .await
            .map_err(|e| EngineError::Storage(anyhow::anyhow!("mint task failed: {}", e)))?
    }

    /// Claims the session for minting, consumes the gift code and calls
    /// the contract. Runs on its own task so it cannot stop halfway.
    async fn begin_submit(
        &self,
        mut session: ClaimSession,
        code: String,
        wallet: String,
    ) -> Result<ClaimSession, EngineError> {
        if !self.try_apply(&session, ClaimStatus::Detected).await? {
            let latest = self.require_session(&session.user_id).await?;
            return Err(match latest.status {
                ClaimStatus::Minting | ClaimStatus::Minted => EngineError::DuplicateClaim(code),
                other => EngineError::transition(other, "submit a claim"),
            });
        }

        let consume = code.clone();
        let now = session.updated_at;
        if !self.db(move |store| store.consume_gift_code(&consume, now)).await? {
            session.status = ClaimStatus::Error;
            session.message = Some("Gift code was already submitted".to_string());
            self.try_apply(&session, ClaimStatus::Minting).await?;
            self.publish(&session);
            return Err(EngineError::DuplicateClaim(code));
        }
        self.publish(&session);

        self.complete_submit(session, code, wallet).await
    }

    async fn complete_submit(
        &self,
        mut session: ClaimSession,
        code: String,
        wallet: String,
    ) -> Result<ClaimSession, EngineError> {
        let result = self.inner.chain.submit_mint(&code, &wallet).await;
        session.updated_at = self.inner.clock.now();

        match result {
            Ok(tx_reference) => {
                info!("Mint for claim {} submitted as {}", session.id, tx_reference);
                session.mint_tx_reference = Some(tx_reference);
                session.message = Some("Mint submitted, waiting for confirmation".to_string());
            }
            Err(e) => {
                warn!("Mint for claim {} failed: {}", session.id, e);
                session.status = ClaimStatus::Error;
                session.message = Some(format!("Mint request failed: {}", e));
            }
        }

        if !self.try_apply(&session, ClaimStatus::Minting).await? {
            return self.require_session(&session.user_id).await;
        }
        self.publish(&session);
        Ok(session)
    }

    /// Re-reads the session and, while minting, asks the chain for the
    /// transaction's status.
    pub async fn refresh(&self, user_id: &str) -> Result<ClaimSession, EngineError> {
        let session = self.require_session(user_id).await?;
        if session.status == ClaimStatus::Minting {
            return self.poll_mint(session).await;
        }
        Ok(session)
    }

    async fn poll_mint(&self, mut session: ClaimSession) -> Result<ClaimSession, EngineError> {
        let Some(tx_reference) = session.mint_tx_reference.clone() else {
            return Ok(session);
        };

        let status = self.inner.chain.transaction_status(&tx_reference).await?;
        session.updated_at = self.inner.clock.now();

        match status {
            TxStatus::Pending => Ok(session),
            TxStatus::Confirmed => self.finalize(session).await,
            TxStatus::Failed(reason) => {
                session.status = ClaimStatus::Error;
                session.message = Some(match reason {
                    Some(r) => format!("Mint transaction failed: {}", r),
                    None => "Mint transaction failed".to_string(),
                });
                if !self.try_apply(&session, ClaimStatus::Minting).await? {
                    return self.require_session(&session.user_id).await;
                }
                warn!("Mint {} for claim {} failed on chain", tx_reference, session.id);
                self.publish(&session);
                Ok(session)
            }
        }
    }

    async fn finalize(&self, mut session: ClaimSession) -> Result<ClaimSession, EngineError> {
        session.status = ClaimStatus::Minted;
        session.message = Some("NFT minted".to_string());

        let reward = NewEntry {
            id: Uuid::new_v4(),
            user_id: session.user_id.clone(),
            kind: EntryKind::NftClaim,
            points_delta: self.inner.config.nft_bonus_points,
            mass_kg: None,
            waste_type_id: None,
            timestamp: session.updated_at,
            reference_id: session.gift_code.clone(),
        };

        let s = session.clone();
        let committed = self.db(move |store| store.finalize_mint(&s, &reward)).await?;
        let Some((entry, balance)) = committed else {
            return self.require_session(&session.user_id).await;
        };

        info!(
            "Claim {} for {} minted, +{} pts",
            session.id, session.user_id, entry.points_delta
        );
        self.inner
            .dispatcher
            .broadcast(EngineEvent::EntryRecorded { entry, balance });
        self.publish(&session);
        Ok(session)
    }

    /// Polls every minting session once. Returns how many reached `minted`.
    pub async fn confirm_pending_mints(&self) -> Result<usize, EngineError> {
        let minting = self
            .db(|store| store.sessions_with_status(ClaimStatus::Minting))
            .await?;

        let mut minted = 0;
        for session in minting {
            let id = session.id;
            match self.poll_mint(session).await {
                Ok(s) if s.status == ClaimStatus::Minted => minted += 1,
                Ok(_) => {}
                Err(e) => warn!("Could not poll mint for claim {}: {}", id, e),
            }
        }
        Ok(minted)
    }

    /// Moves checks that outlived twice the lookup timeout to `error`. These
    /// are left behind when the process stops mid-check.
    pub async fn expire_stale_checks(&self) -> Result<usize, EngineError> {
        let checking = self
            .db(|store| store.sessions_with_status(ClaimStatus::Checking))
            .await?;
        let now = self.inner.clock.now();
        let limit = chrono::Duration::from_std(self.inner.config.check_timeout * 2)
            .unwrap_or_else(|_| chrono::Duration::minutes(2));

        let mut expired = 0;
        for mut session in checking {
            let started = session.checking_started_at.unwrap_or(session.updated_at);
            if now - started < limit {
                continue;
            }
            session.status = ClaimStatus::Error;
            session.message = Some("Verification timed out".to_string());
            session.updated_at = now;
            if self.try_apply(&session, ClaimStatus::Checking).await? {
                info!("Expired stale check for claim {}", session.id);
                self.publish(&session);
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Moves `minting` sessions that never received a transaction reference
    /// within the submit horizon to `error`. These are left behind when the
    /// process stops between claiming the session and calling the contract.
    pub async fn expire_stalled_submissions(&self) -> Result<usize, EngineError> {
        let minting = self
            .db(|store| store.sessions_with_status(ClaimStatus::Minting))
            .await?;
        let now = self.inner.clock.now();
        let limit = chrono::Duration::from_std(self.inner.config.submit_horizon)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));

        let mut expired = 0;
        for mut session in minting {
            if session.mint_tx_reference.is_some() || now - session.updated_at < limit {
                continue;
            }
            session.status = ClaimStatus::Error;
            session.message = Some("Mint was never submitted".to_string());
            session.updated_at = now;
            if self.try_apply(&session, ClaimStatus::Minting).await? {
                warn!("Expired stalled mint submission for claim {}", session.id);
                self.publish(&session);
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Archives the current session. Checks and mints in flight must
    /// finish first.
    pub async fn abandon(&self, user_id: &str) -> Result<(), EngineError> {
        let current = self.require_session(user_id).await?;
        if matches!(current.status, ClaimStatus::Checking | ClaimStatus::Minting) {
            return Err(EngineError::transition(current.status, "abandon the claim"));
        }
        let now = self.inner.clock.now();
        let user = user_id.to_string();
        self.db(move |store| store.archive_claim_session(&user, now))
            .await?;
        info!("User {} abandoned claim {}", user_id, current.id);
        Ok(())
    }

    // -- helpers --

    async fn require_session(&self, user_id: &str) -> Result<ClaimSession, EngineError> {
        self.session(user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("claim session".into()))
    }

    async fn install(&self, session: &ClaimSession) -> Result<(), EngineError> {
        let s = session.clone();
        let now = self.inner.clock.now();
        self.db(move |store| store.replace_claim_session(&s, now)).await
    }

    /// Compare-and-set that treats a lost race as an invalid transition.
    async fn apply(
        &self,
        session: &ClaimSession,
        expected: ClaimStatus,
    ) -> Result<(), EngineError> {
        if self.try_apply(session, expected).await? {
            Ok(())
        } else {
            Err(EngineError::transition(
                format!("no longer {}", expected),
                "update the claim",
            ))
        }
    }

    async fn try_apply(
        &self,
        session: &ClaimSession,
        expected: ClaimStatus,
    ) -> Result<bool, EngineError> {
        let s = session.clone();
        let outcome = self
            .db(move |store| store.transition_claim(&s, expected))
            .await?;
        Ok(outcome == Transition::Applied)
    }

    fn publish(&self, session: &ClaimSession) {
        self.inner.dispatcher.broadcast(EngineEvent::ClaimStatusChanged {
            user_id: session.user_id.clone(),
            session_id: session.id,
            status: session.status,
            message: session.message.clone(),
        });
    }

    /// Runs a store call on the blocking pool.
    async fn db<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Store) -> anyhow::Result<T> + Send + 'static,
    {
        let store = self.inner.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| EngineError::Storage(anyhow::anyhow!("storage task failed: {}", e)))?
            .map_err(EngineError::from)
    }
}

/// Double-checks what the provider reported against the criteria.
fn satisfies(lookup: &PostLookup, criteria: &MatchCriteria) -> bool {
    if !lookup.found {
        return false;
    }
    if let (Some(min), Some(weight)) = (criteria.min_weight_kg, lookup.weight_kg) {
        if weight < min {
            return false;
        }
    }
    if let (Some(want), Some(got)) = (&criteria.location, &lookup.location) {
        if !got.to_lowercase().contains(&want.to_lowercase()) {
            return false;
        }
    }
    true
}

fn new_gift_code(at: DateTime<Utc>) -> String {
    let bytes: [u8; 8] = rand::random();
    format!("GIFT_{}_{}", at.timestamp_millis(), hex::encode_upper(bytes))
}
