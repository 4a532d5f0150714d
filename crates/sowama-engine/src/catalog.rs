use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use sowama_db::Store;
use sowama_types::events::EngineEvent;
use sowama_types::models::{WasteType, WasteTypeRate, WasteTypeWithRate};

use crate::clock::Clock;
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;

/// Registry of deliverable waste types and their versioned rates.
#[derive(Clone)]
pub struct WasteCatalog {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
}

impl WasteCatalog {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, dispatcher: Dispatcher) -> Self {
        Self {
            store,
            clock,
            dispatcher,
        }
    }

    /// Every waste type together with the rate in force right now.
    pub fn list(&self) -> Result<Vec<WasteTypeWithRate>, EngineError> {
        let now = self.clock.now();
        let mut out = Vec::new();
        for waste_type in self.store.waste_types()? {
            if let Some(rate) = self.store.rate_at(&waste_type.id, now)? {
                out.push(WasteTypeWithRate { waste_type, rate });
            }
        }
        Ok(out)
    }

    pub fn waste_type(&self, id: &str) -> Result<WasteType, EngineError> {
        self.store
            .waste_type(id)?
            .ok_or_else(|| EngineError::NotFound(format!("waste type {}", id)))
    }

    pub fn rate_at(
        &self,
        waste_type_id: &str,
        at: DateTime<Utc>,
    ) -> Result<WasteTypeRate, EngineError> {
        self.store
            .rate_at(waste_type_id, at)?
            .ok_or_else(|| EngineError::NotFound(format!("rate for waste type {}", waste_type_id)))
    }

    pub fn rate_history(&self, waste_type_id: &str) -> Result<Vec<WasteTypeRate>, EngineError> {
        self.waste_type(waste_type_id)?;
        Ok(self.store.rate_history(waste_type_id)?)
    }

    /// Adds or renames a waste type. Rates are set separately.
    pub fn upsert_waste_type(&self, waste_type: &WasteType) -> Result<(), EngineError> {
        if waste_type.id.trim().is_empty() || waste_type.name.trim().is_empty() {
            return Err(EngineError::invalid("waste type id and name are required"));
        }
        self.store.upsert_waste_type(waste_type)?;
        Ok(())
    }

    /// Appends a new rate version effective immediately.
    pub fn set_rate(
        &self,
        waste_type_id: &str,
        points_per_kg: f64,
        actor: &str,
    ) -> Result<WasteTypeRate, EngineError> {
        if !points_per_kg.is_finite() || points_per_kg <= 0.0 {
            return Err(EngineError::invalid(format!(
                "points per kg must be positive, got {}",
                points_per_kg
            )));
        }
        self.waste_type(waste_type_id)?;

        let rate = self
            .store
            .append_rate(waste_type_id, points_per_kg, self.clock.now(), actor)?;

        info!(
            "Rate for {} set to {} pts/kg by {} (v{})",
            waste_type_id, points_per_kg, actor, rate.version
        );
        self.dispatcher
            .broadcast(EngineEvent::RateUpdated { rate: rate.clone() });
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use sowama_db::Database;

    fn catalog() -> (WasteCatalog, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store: Arc<dyn Store> = Arc::new(Database::open_in_memory().unwrap());
        (WasteCatalog::new(store, clock.clone(), Dispatcher::new()), clock)
    }

    #[test]
    fn lists_seeded_types_with_current_rates() {
        let (catalog, _) = catalog();
        let types = catalog.list().unwrap();
        assert_eq!(types.len(), 4);
        assert!(types.iter().all(|t| t.rate.points_per_kg > 0.0));
    }

    #[test]
    fn rejects_non_positive_rates() {
        let (catalog, _) = catalog();
        for bad in [0.0, -3.0, f64::NAN] {
            let err = catalog.set_rate("food_scraps", bad, "admin").unwrap_err();
            assert!(matches!(err, EngineError::InvalidInput(_)));
        }
        assert_eq!(catalog.rate_history("food_scraps").unwrap().len(), 1);
    }

    #[test]
    fn unknown_type_is_not_found() {
        let (catalog, _) = catalog();
        let err = catalog.set_rate("plastic", 5.0, "admin").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn old_rate_stays_visible_at_old_times() {
        let (catalog, clock) = catalog();
        let before = clock.now();
        clock.advance(Duration::minutes(10));
        catalog.set_rate("eggshells", 40.0, "admin").unwrap();

        assert_eq!(catalog.rate_at("eggshells", before).unwrap().points_per_kg, 30.0);
        assert_eq!(catalog.rate_at("eggshells", clock.now()).unwrap().points_per_kg, 40.0);
    }
}
