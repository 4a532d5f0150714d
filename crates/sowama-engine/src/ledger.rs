use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use sowama_db::{AppendOutcome, RedeemOutcome, Store};
use sowama_types::events::EngineEvent;
use sowama_types::models::{EntryKind, HistoryOrder, LedgerEntry, NewEntry};

use crate::catalog::WasteCatalog;
use crate::clock::Clock;
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;

const DEFAULT_PAGE_SIZE: u32 = 100;

/// Per-user append-only record of point movements.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
    catalog: WasteCatalog,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
}

/// A committed redemption debit.
#[derive(Debug, Clone)]
pub struct Redemption {
    pub entry: LedgerEntry,
    pub balance: i64,
    pub remaining_stock: Option<i64>,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: WasteCatalog,
        clock: Arc<dyn Clock>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            dispatcher,
        }
    }

    /// Credits a delivery at the rate in force now.
    pub fn record_delivery(
        &self,
        user_id: &str,
        waste_type_id: &str,
        mass_kg: f64,
    ) -> Result<LedgerEntry, EngineError> {
        if !mass_kg.is_finite() || mass_kg <= 0.0 {
            return Err(EngineError::invalid(format!(
                "delivered mass must be positive, got {}",
                mass_kg
            )));
        }

        let now = self.clock.now();
        let rate = self.catalog.rate_at(waste_type_id, now)?;
        let points = (mass_kg * rate.points_per_kg).round();
        if points >= i64::MAX as f64 {
            return Err(EngineError::invalid("delivery is too large to credit"));
        }

        let entry = self.append(NewEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind: EntryKind::Delivery,
            points_delta: points as i64,
            mass_kg: Some(mass_kg),
            waste_type_id: Some(waste_type_id.to_string()),
            timestamp: now,
            reference_id: None,
        })?;

        info!(
            "Delivery by {}: {} kg of {} at v{} -> +{} pts",
            user_id, mass_kg, waste_type_id, rate.version, entry.points_delta
        );
        Ok(entry)
    }

    /// Debits a product's cost. Product lookup, stock, balance check, debit
    /// and stock decrement commit together or not at all.
    pub fn record_redemption(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> Result<Redemption, EngineError> {
        let outcome = self
            .store
            .redeem_product(Uuid::new_v4(), user_id, product_id, self.clock.now())?;

        match outcome {
            RedeemOutcome::Redeemed {
                entry,
                balance,
                remaining_stock,
            } => {
                info!(
                    "Redemption by {}: {} for {} pts, balance now {}",
                    user_id, product_id, -entry.points_delta, balance
                );
                self.dispatcher.broadcast(EngineEvent::EntryRecorded {
                    entry: entry.clone(),
                    balance,
                });
                Ok(Redemption {
                    entry,
                    balance,
                    remaining_stock,
                })
            }
            RedeemOutcome::ProductNotFound => {
                Err(EngineError::NotFound(format!("product {}", product_id)))
            }
            RedeemOutcome::OutOfStock => Err(EngineError::OutOfStock(product_id.to_string())),
            RedeemOutcome::InsufficientBalance { balance, cost } => {
                debug!(
                    "Redemption by {} of {} rejected: balance {} < cost {}",
                    user_id, product_id, balance, cost
                );
                Err(EngineError::InsufficientBalance {
                    balance,
                    required: cost,
                    shortfall: cost - balance,
                })
            }
        }
    }

    /// Debits points donated to a project.
    pub fn record_donation(
        &self,
        user_id: &str,
        points: i64,
        project: &str,
    ) -> Result<LedgerEntry, EngineError> {
        if points <= 0 {
            return Err(EngineError::invalid(format!(
                "donation must be a positive number of points, got {}",
                points
            )));
        }
        if project.trim().is_empty() {
            return Err(EngineError::invalid("donation project is required"));
        }

        let entry = self.append(NewEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kind: EntryKind::Donation,
            points_delta: -points,
            mass_kg: None,
            waste_type_id: None,
            timestamp: self.clock.now(),
            reference_id: Some(project.to_string()),
        })?;

        info!("Donation by {}: {} pts to {}", user_id, points, project);
        Ok(entry)
    }

    pub fn balance(&self, user_id: &str) -> Result<i64, EngineError> {
        Ok(self.store.balance(user_id)?)
    }

    /// Lazy view over a user's entries. Iterating fetches one page at a
    /// time; calling `iter()` again starts over.
    pub fn history(&self, user_id: &str, order: HistoryOrder) -> History {
        History {
            store: self.store.clone(),
            user_id: user_id.to_string(),
            order,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    fn append(&self, entry: NewEntry) -> Result<LedgerEntry, EngineError> {
        let required = -entry.points_delta;
        match self.store.append_entry(&entry)? {
            AppendOutcome::Appended { entry, balance } => {
                self.dispatcher.broadcast(EngineEvent::EntryRecorded {
                    entry: entry.clone(),
                    balance,
                });
                Ok(entry)
            }
            AppendOutcome::InsufficientBalance { balance } => {
                debug!(
                    "{} of {} pts for {} rejected: balance {}",
                    entry.kind, required, entry.user_id, balance
                );
                Err(EngineError::InsufficientBalance {
                    balance,
                    required,
                    shortfall: required - balance,
                })
            }
        }
    }
}

/// Restartable, finite sequence of a user's ledger entries.
#[derive(Clone)]
pub struct History {
    store: Arc<dyn Store>,
    user_id: String,
    order: HistoryOrder,
    page_size: u32,
}

impl History {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn order(&self) -> HistoryOrder {
        self.order
    }

    pub fn iter(&self) -> HistoryIter {
        HistoryIter {
            history: self.clone(),
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Reads at most `limit` entries eagerly.
    pub fn take(&self, limit: usize) -> Result<Vec<LedgerEntry>, EngineError> {
        self.iter().take(limit).collect()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = Result<LedgerEntry, EngineError>;
    type IntoIter = HistoryIter;

    fn into_iter(self) -> HistoryIter {
        self.iter()
    }
}

pub struct HistoryIter {
    history: History,
    cursor: Option<i64>,
    buffer: VecDeque<LedgerEntry>,
    exhausted: bool,
}

impl Iterator for HistoryIter {
    type Item = Result<LedgerEntry, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = self.history.store.entries_page(
                &self.history.user_id,
                self.history.order,
                self.cursor,
                self.history.page_size,
            );
            match page {
                Ok(page) => {
                    if (page.len() as u32) < self.history.page_size {
                        self.exhausted = true;
                    }
                    self.cursor = page.last().map(|e| e.seq).or(self.cursor);
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e.into()));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;
    use sowama_db::Database;
    use sowama_types::models::Product;

    fn ledger() -> (Ledger, Arc<dyn Store>) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let store: Arc<dyn Store> = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let catalog = WasteCatalog::new(store.clone(), clock.clone(), dispatcher.clone());
        (Ledger::new(store.clone(), catalog, clock, dispatcher), store)
    }

    fn product(store: &Arc<dyn Store>, id: &str, cost: i64, stock: Option<i64>) {
        store
            .upsert_product(&Product {
                id: id.to_string(),
                name: id.to_string(),
                description: String::new(),
                points_cost: cost,
                category: "test".into(),
                stock,
            })
            .unwrap();
    }

    #[test]
    fn delivery_then_redemptions() {
        let (ledger, store) = ledger();
        product(&store, "p80", 80, None);
        product(&store, "p50", 50, None);

        let entry = ledger.record_delivery("u1", "food_scraps", 5.0).unwrap();
        assert_eq!(entry.points_delta, 100);
        assert_eq!(ledger.balance("u1").unwrap(), 100);

        let redemption = ledger.record_redemption("u1", "p80").unwrap();
        assert_eq!(redemption.entry.points_delta, -80);
        assert_eq!(redemption.balance, 20);

        let err = ledger.record_redemption("u1", "p50").unwrap_err();
        match err {
            EngineError::InsufficientBalance {
                balance,
                required,
                shortfall,
            } => {
                assert_eq!((balance, required, shortfall), (20, 50, 30));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ledger.balance("u1").unwrap(), 20);
        assert_eq!(ledger.history("u1", HistoryOrder::OldestFirst).take(10).unwrap().len(), 2);
    }

    #[test]
    fn delivery_points_are_rounded() {
        let (ledger, _) = ledger();
        // garden_waste is 15 pts/kg: 0.3 kg -> 4.5 -> 5
        let entry = ledger.record_delivery("u1", "garden_waste", 0.3).unwrap();
        assert_eq!(entry.points_delta, 5);
    }

    #[test]
    fn invalid_deliveries_write_nothing() {
        let (ledger, _) = ledger();
        for mass in [0.0, -1.0, f64::INFINITY] {
            assert!(matches!(
                ledger.record_delivery("u1", "food_scraps", mass),
                Err(EngineError::InvalidInput(_))
            ));
        }
        assert!(matches!(
            ledger.record_delivery("u1", "glass", 1.0),
            Err(EngineError::NotFound(_))
        ));
        assert!(ledger.history("u1", HistoryOrder::NewestFirst).take(10).unwrap().is_empty());
    }

    #[test]
    fn donations_respect_balance() {
        let (ledger, _) = ledger();
        ledger.record_delivery("u1", "food_scraps", 1.0).unwrap();
        assert!(matches!(
            ledger.record_donation("u1", 21, "amazon-reforestation"),
            Err(EngineError::InsufficientBalance { shortfall: 1, .. })
        ));
        let entry = ledger.record_donation("u1", 20, "amazon-reforestation").unwrap();
        assert_eq!(entry.kind, EntryKind::Donation);
        assert_eq!(ledger.balance("u1").unwrap(), 0);
    }

    #[test]
    fn running_sum_never_negative() {
        let (ledger, store) = ledger();
        product(&store, "p30", 30, None);

        // Interleave credits and debits, some of which must be refused
        let ops: [(&str, f64); 8] = [
            ("deliver", 1.0),
            ("redeem", 0.0),
            ("redeem", 0.0),
            ("deliver", 2.0),
            ("redeem", 0.0),
            ("redeem", 0.0),
            ("redeem", 0.0),
            ("deliver", 0.5),
        ];
        for (op, mass) in ops {
            let _ = match op {
                "deliver" => ledger.record_delivery("u1", "food_scraps", mass).map(|_| ()),
                _ => ledger.record_redemption("u1", "p30").map(|_| ()),
            };
        }

        let mut running = 0;
        for entry in &ledger.history("u1", HistoryOrder::OldestFirst) {
            running += entry.unwrap().points_delta;
            assert!(running >= 0);
        }
        assert_eq!(running, ledger.balance("u1").unwrap());
    }

    #[test]
    fn history_pages_lazily_and_restarts() {
        let (ledger, _) = ledger();
        for _ in 0..7 {
            ledger.record_delivery("u1", "food_scraps", 1.0).unwrap();
        }

        let history = ledger.history("u1", HistoryOrder::NewestFirst).with_page_size(3);
        let first: Vec<i64> = history.iter().map(|e| e.unwrap().seq).collect();
        assert_eq!(first.len(), 7);
        assert!(first.windows(2).all(|w| w[0] > w[1]));

        let again: Vec<i64> = history.iter().map(|e| e.unwrap().seq).collect();
        assert_eq!(first, again);
    }
}
