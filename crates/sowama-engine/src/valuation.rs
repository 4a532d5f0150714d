use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use sowama_db::{Store, TokenAppendOutcome};
use sowama_types::events::EngineEvent;
use sowama_types::models::{
    TOKEN_NAME, TOKEN_SYMBOL, TOKEN_TOTAL_SUPPLY, TokenStats, TokenValueRecord,
};

use crate::clock::Clock;
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;

pub const CURRENCY: &str = "USD";

/// USD value of one point-equivalent token, kept as an append-only history.
#[derive(Clone)]
pub struct TokenValuation {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
}

impl TokenValuation {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, dispatcher: Dispatcher) -> Self {
        Self {
            store,
            clock,
            dispatcher,
        }
    }

    /// Writes the launch value if no history exists yet. It is effective
    /// from the Unix epoch so every point in time has a value.
    pub fn seed(&self, initial_value: f64) -> Result<(), EngineError> {
        validate(initial_value)?;
        if !self.store.token_history()?.is_empty() {
            return Ok(());
        }
        self.store.append_token_value(&TokenValueRecord {
            value: initial_value,
            currency: CURRENCY.to_string(),
            effective_at: DateTime::<Utc>::UNIX_EPOCH,
            actor: "seed".to_string(),
        })?;
        info!("Token value seeded at {} {}", initial_value, CURRENCY);
        Ok(())
    }

    pub fn current_value(&self) -> Result<f64, EngineError> {
        self.value_at(self.clock.now())
    }

    pub fn current_record(&self) -> Result<TokenValueRecord, EngineError> {
        self.record_at(self.clock.now())
    }

    /// Value of the record with the latest `effective_at <= at`.
    pub fn value_at(&self, at: DateTime<Utc>) -> Result<f64, EngineError> {
        self.record_at(at).map(|r| r.value)
    }

    pub fn record_at(&self, at: DateTime<Utc>) -> Result<TokenValueRecord, EngineError> {
        self.store
            .token_value_at(at)?
            .ok_or_else(|| EngineError::NotFound(format!("token value at {}", at)))
    }

    /// Appends a new value. `effective_at` defaults to now and may not
    /// precede the latest record.
    pub fn update_value(
        &self,
        new_value: f64,
        actor: &str,
        effective_at: Option<DateTime<Utc>>,
    ) -> Result<TokenValueRecord, EngineError> {
        validate(new_value)?;

        let record = TokenValueRecord {
            value: new_value,
            currency: CURRENCY.to_string(),
            effective_at: effective_at.unwrap_or_else(|| self.clock.now()),
            actor: actor.to_string(),
        };

        match self.store.append_token_value(&record)? {
            TokenAppendOutcome::Appended(record) => {
                info!(
                    "Token value set to {} {} by {} effective {}",
                    record.value, record.currency, record.actor, record.effective_at
                );
                self.dispatcher.broadcast(EngineEvent::TokenValueUpdated {
                    record: record.clone(),
                });
                Ok(record)
            }
            TokenAppendOutcome::Backdated { latest } => Err(EngineError::invalid(format!(
                "effective time {} precedes the latest recorded value at {}",
                record.effective_at, latest
            ))),
        }
    }

    pub fn history(&self) -> Result<Vec<TokenValueRecord>, EngineError> {
        Ok(self.store.token_history()?)
    }

    pub fn stats(&self) -> Result<TokenStats, EngineError> {
        let history = self.store.token_history()?;
        let initial = history
            .first()
            .ok_or_else(|| EngineError::NotFound("token value history".into()))?;
        let current = self.record_at(self.clock.now())?;
        let totals = self.store.ledger_totals()?;

        Ok(TokenStats {
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            total_supply: TOKEN_TOTAL_SUPPLY,
            circulating_supply: totals.circulating,
            initial_value_usd: initial.value,
            current_value_usd: current.value,
            last_updated: current.effective_at,
        })
    }
}

fn validate(value: f64) -> Result<(), EngineError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EngineError::invalid(format!(
            "token value must be a positive number, got {}",
            value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use sowama_db::Database;

    fn valuation() -> (TokenValuation, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store: Arc<dyn Store> = Arc::new(Database::open_in_memory().unwrap());
        let valuation = TokenValuation::new(store, clock.clone(), Dispatcher::new());
        valuation.seed(0.010).unwrap();
        (valuation, clock)
    }

    #[test]
    fn update_is_visible_and_history_is_kept() {
        let (valuation, clock) = valuation();
        assert_eq!(valuation.current_value().unwrap(), 0.010);

        clock.advance(Duration::hours(1));
        let t = clock.now();
        valuation.update_value(0.015, "admin", None).unwrap();

        assert_eq!(valuation.current_value().unwrap(), 0.015);
        assert_eq!(valuation.value_at(t - Duration::seconds(1)).unwrap(), 0.010);
        assert_eq!(valuation.history().unwrap().len(), 2);
    }

    #[test]
    fn past_lookups_survive_later_updates() {
        let (valuation, clock) = valuation();
        let seeded_at = clock.now();
        for value in [0.011, 0.012, 0.013] {
            clock.advance(Duration::minutes(1));
            valuation.update_value(value, "admin", None).unwrap();
            assert_eq!(valuation.value_at(seeded_at).unwrap(), 0.010);
        }
    }

    #[test]
    fn invalid_values_leave_state_unchanged() {
        let (valuation, _) = valuation();
        for bad in [0.0, -0.01, f64::NAN] {
            assert!(matches!(
                valuation.update_value(bad, "admin", None),
                Err(EngineError::InvalidInput(_))
            ));
        }
        assert_eq!(valuation.history().unwrap().len(), 1);
    }

    #[test]
    fn backdated_update_is_rejected() {
        let (valuation, clock) = valuation();
        clock.advance(Duration::hours(2));
        valuation.update_value(0.02, "admin", None).unwrap();

        let err = valuation
            .update_value(0.03, "admin", Some(clock.now() - Duration::hours(1)))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert_eq!(valuation.current_value().unwrap(), 0.02);
    }

    #[test]
    fn scheduled_value_applies_when_due() {
        let (valuation, clock) = valuation();
        let due = clock.now() + Duration::days(1);
        valuation.update_value(0.05, "admin", Some(due)).unwrap();
        assert_eq!(valuation.current_value().unwrap(), 0.010);
        clock.set(due);
        assert_eq!(valuation.current_value().unwrap(), 0.05);
    }

    #[test]
    fn seeding_twice_is_a_no_op() {
        let (valuation, _) = valuation();
        valuation.seed(0.5).unwrap();
        let stats = valuation.stats().unwrap();
        assert_eq!(stats.initial_value_usd, 0.010);
        assert_eq!(stats.symbol, "SWT");
        assert_eq!(stats.circulating_supply, 0);
    }
}
