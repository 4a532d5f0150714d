use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use sowama_types::models::{
    ClaimSession, ClaimStatus, HistoryOrder, LedgerEntry, NewEntry, Product, TokenValueRecord,
    WasteType, WasteTypeRate,
};

/// Result of a balance-checked append.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Appended { entry: LedgerEntry, balance: i64 },
    /// Nothing was written; `balance` is the balance the check saw.
    InsufficientBalance { balance: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedeemOutcome {
    Redeemed {
        entry: LedgerEntry,
        balance: i64,
        remaining_stock: Option<i64>,
    },
    ProductNotFound,
    OutOfStock,
    InsufficientBalance { balance: i64, cost: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenAppendOutcome {
    Appended(TokenValueRecord),
    /// `effective_at` was earlier than the latest record and would rewrite history.
    Backdated { latest: DateTime<Utc> },
}

/// Outcome of a compare-and-set on a claim session's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The stored session was no longer in the expected status.
    Stale,
    /// The session carried a gift code that already exists.
    GiftCodeTaken,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub users: i64,
    pub points_issued: i64,
    pub points_spent: i64,
    pub circulating: i64,
}

/// Storage capability injected into the engine.
///
/// Every method that mutates more than one row does so in a single
/// transaction; callers never have to read-then-write to keep the
/// ledger consistent.
pub trait Store: Send + Sync {
    // -- Waste catalog --

    fn waste_types(&self) -> Result<Vec<WasteType>>;
    fn waste_type(&self, id: &str) -> Result<Option<WasteType>>;
    fn upsert_waste_type(&self, waste_type: &WasteType) -> Result<()>;
    /// Appends the next rate version for a waste type.
    fn append_rate(
        &self,
        waste_type_id: &str,
        points_per_kg: f64,
        effective_from: DateTime<Utc>,
        set_by: &str,
    ) -> Result<WasteTypeRate>;
    /// Latest version with `effective_from <= at`.
    fn rate_at(&self, waste_type_id: &str, at: DateTime<Utc>) -> Result<Option<WasteTypeRate>>;
    fn rate_history(&self, waste_type_id: &str) -> Result<Vec<WasteTypeRate>>;

    // -- Ledger --

    /// Inserts the entry unless it would drive the user's balance negative.
    fn append_entry(&self, entry: &NewEntry) -> Result<AppendOutcome>;
    /// Looks up the product, checks stock and balance, inserts the debit
    /// and decrements stock, all in one transaction.
    fn redeem_product(
        &self,
        entry_id: Uuid,
        user_id: &str,
        product_id: &str,
        at: DateTime<Utc>,
    ) -> Result<RedeemOutcome>;
    fn balance(&self, user_id: &str) -> Result<i64>;
    /// One page of a user's entries. `after_seq` is an exclusive cursor in
    /// the direction of `order`.
    fn entries_page(
        &self,
        user_id: &str,
        order: HistoryOrder,
        after_seq: Option<i64>,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>>;
    /// Cumulative delivered kg per waste type, for one user or everyone.
    fn delivered_mass(&self, user_id: Option<&str>) -> Result<BTreeMap<String, f64>>;
    fn ledger_totals(&self) -> Result<LedgerTotals>;

    // -- Token valuation --

    fn append_token_value(&self, record: &TokenValueRecord) -> Result<TokenAppendOutcome>;
    fn token_value_at(&self, at: DateTime<Utc>) -> Result<Option<TokenValueRecord>>;
    /// Every record, oldest first.
    fn token_history(&self) -> Result<Vec<TokenValueRecord>>;

    // -- Products --

    fn products(&self, category: Option<&str>) -> Result<Vec<Product>>;
    fn product(&self, id: &str) -> Result<Option<Product>>;
    fn upsert_product(&self, product: &Product) -> Result<()>;

    // -- Claim sessions --

    fn claim_session(&self, user_id: &str) -> Result<Option<ClaimSession>>;
    /// Archives the user's current session (if any) and installs `session`.
    fn replace_claim_session(
        &self,
        session: &ClaimSession,
        archived_at: DateTime<Utc>,
    ) -> Result<()>;
    /// Writes `session` only if the stored row still has `expected` status.
    /// A gift code on the session is registered in the same transaction.
    fn transition_claim(&self, session: &ClaimSession, expected: ClaimStatus) -> Result<Transition>;
    /// Marks a gift code as submitted. Returns false if it was not in the
    /// `issued` state, so each code goes out at most once.
    fn consume_gift_code(&self, code: &str, at: DateTime<Utc>) -> Result<bool>;
    /// Moves a `minting` session to `minted` and appends the reward entry
    /// atomically. Returns `None` if the session had already moved on.
    fn finalize_mint(
        &self,
        session: &ClaimSession,
        reward: &NewEntry,
    ) -> Result<Option<(LedgerEntry, i64)>>;
    fn sessions_with_status(&self, status: ClaimStatus) -> Result<Vec<ClaimSession>>;
    /// Archives and removes the user's current session.
    fn archive_claim_session(&self, user_id: &str, archived_at: DateTime<Utc>) -> Result<bool>;
    /// Archived sessions, newest first.
    fn claim_history(&self, user_id: &str) -> Result<Vec<ClaimSession>>;
}
