use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{HistoryOrder, LedgerEntry};

// -- JWT Claims --

/// Bearer token claims. Tokens are issued by the account service;
/// this server only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub role: Role,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

// -- Ledger --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryRequest {
    pub waste_type_id: String,
    pub mass_kg: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DonationRequest {
    pub points: i64,
    pub project: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub order: HistoryOrder,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub points: i64,
}

// -- Marketplace --

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpsertProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub points_cost: i64,
    pub category: String,
    pub stock: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RedemptionResponse {
    pub success: bool,
    pub entry: Option<LedgerEntry>,
    pub reason: Option<String>,
    pub shortfall: Option<i64>,
}

// -- Valuation / catalog administration --

#[derive(Debug, Deserialize)]
pub struct ValueAtQuery {
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTokenValueRequest {
    pub value: f64,
    pub effective_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRateRequest {
    pub points_per_kg: f64,
}

// -- NFT claim --

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSocialRequest {
    pub handle: String,
    pub access_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyPostRequest {
    pub min_weight_kg: Option<f64>,
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MintRequest {
    pub wallet_address: Option<String>,
}

// -- Errors --

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<i64>,
}
