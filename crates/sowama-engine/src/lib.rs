pub mod catalog;
pub mod claim;
pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod impact;
pub mod ledger;
pub mod marketplace;
pub mod providers;
pub mod testing;
pub mod valuation;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use sowama_db::Store;
use sowama_types::events::EngineEvent;
use sowama_types::models::{BalanceValue, ImpactSnapshot, SystemStats};

pub use catalog::WasteCatalog;
pub use claim::{ClaimConfig, ClaimMachine};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::Dispatcher;
pub use error::EngineError;
pub use ledger::{History, Ledger};
pub use marketplace::{Marketplace, RedemptionFailure, RedemptionResult};
pub use providers::{BlockchainProvider, ProviderError, SocialVerificationProvider};
pub use valuation::TokenValuation;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub initial_token_value: f64,
    pub nft_bonus_points: i64,
    pub claim_lookback: chrono::Duration,
    pub check_timeout: Duration,
    pub mention_tag: String,
    pub mint_submit_horizon: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let claim = ClaimConfig::default();
        Self {
            initial_token_value: 0.01,
            nft_bonus_points: claim.nft_bonus_points,
            claim_lookback: claim.lookback,
            check_timeout: claim.check_timeout,
            mention_tag: claim.mention_tag,
            mint_submit_horizon: claim.submit_horizon,
        }
    }
}

/// All engine components over one store, one clock and one event bus.
#[derive(Clone)]
pub struct Engine {
    pub catalog: WasteCatalog,
    pub ledger: Ledger,
    pub valuation: TokenValuation,
    pub marketplace: Marketplace,
    pub claims: ClaimMachine,
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Wires the components and seeds the token value on a fresh store.
    pub fn new(
        store: Arc<dyn Store>,
        social: Arc<dyn SocialVerificationProvider>,
        chain: Arc<dyn BlockchainProvider>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        if config.nft_bonus_points < 0 {
            return Err(EngineError::invalid(format!(
                "NFT claim bonus must not be negative, got {}",
                config.nft_bonus_points
            )));
        }

        let dispatcher = Dispatcher::new();
        let catalog = WasteCatalog::new(store.clone(), clock.clone(), dispatcher.clone());
        let ledger = Ledger::new(store.clone(), catalog.clone(), clock.clone(), dispatcher.clone());
        let valuation = TokenValuation::new(store.clone(), clock.clone(), dispatcher.clone());
        let marketplace = Marketplace::new(store.clone(), ledger.clone());
        let claims = ClaimMachine::new(
            store.clone(),
            social,
            chain,
            clock,
            dispatcher.clone(),
            ClaimConfig {
                nft_bonus_points: config.nft_bonus_points,
                lookback: config.claim_lookback,
                check_timeout: config.check_timeout,
                mention_tag: config.mention_tag,
                submit_horizon: config.mint_submit_horizon,
            },
        );

        valuation.seed(config.initial_token_value)?;

        Ok(Self {
            catalog,
            ledger,
            valuation,
            marketplace,
            claims,
            store,
            dispatcher,
        })
    }

    pub fn impact_for(&self, user_id: &str) -> Result<ImpactSnapshot, EngineError> {
        Ok(impact::calculate(&self.store.delivered_mass(Some(user_id))?))
    }

    pub fn system_impact(&self) -> Result<ImpactSnapshot, EngineError> {
        Ok(impact::calculate(&self.store.delivered_mass(None)?))
    }

    pub fn system_stats(&self) -> Result<SystemStats, EngineError> {
        let delivered_kg = self.store.delivered_mass(None)?;
        let totals = self.store.ledger_totals()?;
        Ok(SystemStats {
            users: totals.users,
            impact: impact::calculate(&delivered_kg),
            delivered_kg,
            points_issued: totals.points_issued,
            points_spent: totals.points_spent,
            circulating_points: totals.circulating,
        })
    }

    /// A user's balance together with its USD value at the current rate.
    pub fn value_of_balance(&self, user_id: &str) -> Result<BalanceValue, EngineError> {
        let points = self.ledger.balance(user_id)?;
        let token_value_usd = self.valuation.current_value()?;
        Ok(BalanceValue {
            points,
            token_value_usd,
            usd: points as f64 * token_value_usd,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.dispatcher.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedChain, ScriptedSocial};
    use chrono::Utc;
    use sowama_db::Database;
    use sowama_types::models::EntryKind;

    fn engine() -> Engine {
        Engine::new(
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(ScriptedSocial::new()),
            Arc::new(ScriptedChain::new()),
            Arc::new(ManualClock::new(Utc::now())),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn negative_claim_bonus_is_refused() {
        let result = Engine::new(
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(ScriptedSocial::new()),
            Arc::new(ScriptedChain::new()),
            Arc::new(ManualClock::new(Utc::now())),
            EngineConfig {
                nft_bonus_points: -10,
                ..EngineConfig::default()
            },
        );
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn balance_value_uses_current_token_value() {
        let engine = engine();
        engine.ledger.record_delivery("u1", "food_scraps", 5.0).unwrap();
        let value = engine.value_of_balance("u1").unwrap();
        assert_eq!(value.points, 100);
        assert_eq!(value.token_value_usd, 0.01);
        assert!((value.usd - 1.0).abs() < 1e-9);
    }

    #[test]
    fn impact_is_per_user_and_system_wide() {
        let engine = engine();
        engine.ledger.record_delivery("u1", "food_scraps", 44.0).unwrap();
        engine.ledger.record_delivery("u2", "garden_waste", 10.0).unwrap();

        let mine = engine.impact_for("u1").unwrap();
        assert!((mine.trees_equivalent - 1.0).abs() < 1e-9);

        let all = engine.system_impact().unwrap();
        assert!(all.co2_avoided > mine.co2_avoided);
        assert_eq!(engine.impact_for("nobody").unwrap(), ImpactSnapshot::default());
    }

    #[test]
    fn stats_track_issued_and_spent() {
        let engine = engine();
        engine.ledger.record_delivery("u1", "food_scraps", 5.0).unwrap();
        engine.ledger.record_donation("u1", 30, "amazon-reforestation").unwrap();

        let stats = engine.system_stats().unwrap();
        assert_eq!(stats.users, 1);
        assert_eq!(stats.points_issued, 100);
        assert_eq!(stats.points_spent, 30);
        assert_eq!(stats.circulating_points, 70);
        assert_eq!(stats.delivered_kg.get("food_scraps"), Some(&5.0));
    }

    #[tokio::test]
    async fn committed_entries_are_broadcast() {
        let engine = engine();
        let mut rx = engine.subscribe();
        engine.ledger.record_delivery("u1", "eggshells", 1.0).unwrap();
        match rx.recv().await.unwrap() {
            EngineEvent::EntryRecorded { entry, balance } => {
                assert_eq!(entry.kind, EntryKind::Delivery);
                assert_eq!(balance, 30);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
