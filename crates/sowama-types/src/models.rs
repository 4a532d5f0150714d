use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Waste catalog --

/// Display metadata for a deliverable waste type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasteType {
    pub id: String,
    pub name: String,
    pub description: String,
    pub color: String,
}

/// One version of a waste type's points-per-kilogram rate.
/// Superseded versions are kept so past deliveries stay valued as recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasteTypeRate {
    pub waste_type_id: String,
    pub version: i64,
    pub points_per_kg: f64,
    pub effective_from: DateTime<Utc>,
    pub set_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WasteTypeWithRate {
    #[serde(flatten)]
    pub waste_type: WasteType,
    pub rate: WasteTypeRate,
}

// -- Ledger --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Delivery,
    Redemption,
    Donation,
    NftClaim,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivery => "delivery",
            Self::Redemption => "redemption",
            Self::Donation => "donation",
            Self::NftClaim => "nft_claim",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivery" => Ok(Self::Delivery),
            "redemption" => Ok(Self::Redemption),
            "donation" => Ok(Self::Donation),
            "nft_claim" => Ok(Self::NftClaim),
            other => Err(format!("unknown entry kind: {}", other)),
        }
    }
}

/// An immutable, signed, point-affecting record.
///
/// `seq` is assigned by the store at insertion and is the authoritative
/// ordering within a user's history; timestamps never go backwards along it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub seq: i64,
    pub user_id: String,
    pub kind: EntryKind,
    pub points_delta: i64,
    pub mass_kg: Option<f64>,
    pub waste_type_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub reference_id: Option<String>,
}

/// An entry that has not been written yet. The store assigns `seq`
/// and the final timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub id: Uuid,
    pub user_id: String,
    pub kind: EntryKind,
    pub points_delta: i64,
    pub mass_kg: Option<f64>,
    pub waste_type_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrder {
    OldestFirst,
    #[default]
    NewestFirst,
}

// -- Token valuation --

pub const TOKEN_NAME: &str = "SowamaToken";
pub const TOKEN_SYMBOL: &str = "SWT";
pub const TOKEN_TOTAL_SUPPLY: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenValueRecord {
    pub value: f64,
    pub currency: String,
    pub effective_at: DateTime<Utc>,
    pub actor: String,
}

/// A balance priced at the token value in force.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceValue {
    pub points: i64,
    pub token_value_usd: f64,
    pub usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStats {
    pub name: String,
    pub symbol: String,
    pub total_supply: i64,
    pub circulating_supply: i64,
    pub initial_value_usd: f64,
    pub current_value_usd: f64,
    pub last_updated: DateTime<Utc>,
}

// -- Marketplace --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub points_cost: i64,
    pub category: String,
    /// `None` means stock is not tracked.
    pub stock: Option<i64>,
}

// -- Environmental impact --

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactSnapshot {
    /// kg of CO2 kept out of the atmosphere
    pub co2_avoided: f64,
    /// kg of compost
    pub compost_generated: f64,
    /// m3 of biogas
    pub biogas_produced: f64,
    pub trees_equivalent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub users: i64,
    pub delivered_kg: std::collections::BTreeMap<String, f64>,
    pub points_issued: i64,
    pub points_spent: i64,
    pub circulating_points: i64,
    pub impact: ImpactSnapshot,
}

// -- NFT claim --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    NotAuthenticated,
    AwaitingPost,
    Checking,
    Detected,
    NotFound,
    Error,
    Minting,
    Minted,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::AwaitingPost => "awaiting_post",
            Self::Checking => "checking",
            Self::Detected => "detected",
            Self::NotFound => "not_found",
            Self::Error => "error",
            Self::Minting => "minting",
            Self::Minted => "minted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound | Self::Error | Self::Minted)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_authenticated" => Ok(Self::NotAuthenticated),
            "awaiting_post" => Ok(Self::AwaitingPost),
            "checking" => Ok(Self::Checking),
            "detected" => Ok(Self::Detected),
            "not_found" => Ok(Self::NotFound),
            "error" => Ok(Self::Error),
            "minting" => Ok(Self::Minting),
            "minted" => Ok(Self::Minted),
            other => Err(format!("unknown claim status: {}", other)),
        }
    }
}

/// A user's NFT reward claim attempt. At most one per user is current;
/// replaced sessions move to the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSession {
    pub id: Uuid,
    pub user_id: String,
    pub status: ClaimStatus,
    pub social_account_id: Option<String>,
    pub gift_code: Option<String>,
    pub tweet_reference: Option<String>,
    pub mint_tx_reference: Option<String>,
    pub wallet_address: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub checking_started_at: Option<DateTime<Utc>>,
}

impl ClaimSession {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            status: ClaimStatus::NotAuthenticated,
            social_account_id: None,
            gift_code: None,
            tweet_reference: None,
            mint_tx_reference: None,
            wallet_address: None,
            message: None,
            created_at: now,
            updated_at: now,
            checking_started_at: None,
        }
    }
}

/// What a qualifying post has to contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCriteria {
    pub mention_tag: String,
    pub min_weight_kg: Option<f64>,
    pub location: Option<String>,
}
