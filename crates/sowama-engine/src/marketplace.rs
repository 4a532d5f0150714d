use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use sowama_db::Store;
use sowama_types::models::{LedgerEntry, Product};

use crate::error::EngineError;
use crate::ledger::Ledger;

/// Why a redemption did not go through.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RedemptionFailure {
    NotFound,
    OutOfStock,
    InsufficientBalance { balance: i64, cost: i64, shortfall: i64 },
}

impl fmt::Display for RedemptionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("product not found"),
            Self::OutOfStock => f.write_str("product is out of stock"),
            Self::InsufficientBalance { shortfall, .. } => {
                write!(f, "you need {} more points for this product", shortfall)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RedemptionResult {
    pub success: bool,
    pub entry: Option<LedgerEntry>,
    pub reason: Option<RedemptionFailure>,
    pub remaining_stock: Option<i64>,
}

impl RedemptionResult {
    fn failed(reason: RedemptionFailure) -> Self {
        Self {
            success: false,
            entry: None,
            reason: Some(reason),
            remaining_stock: None,
        }
    }
}

/// Product catalog and balance-gated redemption.
#[derive(Clone)]
pub struct Marketplace {
    store: Arc<dyn Store>,
    ledger: Ledger,
}

impl Marketplace {
    pub fn new(store: Arc<dyn Store>, ledger: Ledger) -> Self {
        Self { store, ledger }
    }

    pub fn products(&self, category: Option<&str>) -> Result<Vec<Product>, EngineError> {
        Ok(self.store.products(category)?)
    }

    pub fn product(&self, id: &str) -> Result<Product, EngineError> {
        self.store
            .product(id)?
            .ok_or_else(|| EngineError::NotFound(format!("product {}", id)))
    }

    pub fn upsert_product(&self, product: &Product) -> Result<(), EngineError> {
        if product.id.trim().is_empty() || product.name.trim().is_empty() {
            return Err(EngineError::invalid("product id and name are required"));
        }
        if product.points_cost <= 0 {
            return Err(EngineError::invalid(format!(
                "points cost must be positive, got {}",
                product.points_cost
            )));
        }
        if product.stock.is_some_and(|s| s < 0) {
            return Err(EngineError::invalid("stock cannot be negative"));
        }
        self.store.upsert_product(product)?;
        info!("Product {} saved ({} pts)", product.id, product.points_cost);
        Ok(())
    }

    /// Redeems one unit of a product. Business rejections come back as a
    /// failed result; only storage faults are errors. A successful call
    /// writes exactly one entry, a failed one writes nothing.
    pub fn redeem(&self, user_id: &str, product_id: &str) -> Result<RedemptionResult, EngineError> {
        match self.ledger.record_redemption(user_id, product_id) {
            Ok(redemption) => Ok(RedemptionResult {
                success: true,
                entry: Some(redemption.entry),
                reason: None,
                remaining_stock: redemption.remaining_stock,
            }),
            Err(EngineError::NotFound(_)) => {
                Ok(RedemptionResult::failed(RedemptionFailure::NotFound))
            }
            Err(EngineError::OutOfStock(_)) => {
                Ok(RedemptionResult::failed(RedemptionFailure::OutOfStock))
            }
            Err(EngineError::InsufficientBalance {
                balance,
                required,
                shortfall,
            }) => Ok(RedemptionResult::failed(
                RedemptionFailure::InsufficientBalance {
                    balance,
                    cost: required,
                    shortfall,
                },
            )),
            Err(e) => Err(e),
        }
    }
}
