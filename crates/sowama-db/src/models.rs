/// Database row types. These map directly to SQLite rows.
/// Conversions into the domain models in sowama-types live here too,
/// so the query code never parses text columns by hand.
use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use sowama_types::models::{ClaimSession, LedgerEntry};

/// Fixed-width RFC 3339 so that text comparison in SQL matches time order.
pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("Corrupt timestamp '{}': {}", raw, e))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

pub struct LedgerRow {
    pub seq: i64,
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub points_delta: i64,
    pub mass_kg: Option<f64>,
    pub waste_type_id: Option<String>,
    pub timestamp: String,
    pub reference_id: Option<String>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = anyhow::Error;

    fn try_from(row: LedgerRow) -> Result<Self> {
        Ok(LedgerEntry {
            id: row
                .id
                .parse::<Uuid>()
                .map_err(|e| anyhow!("Corrupt entry id '{}': {}", row.id, e))?,
            seq: row.seq,
            user_id: row.user_id,
            kind: row.kind.parse().map_err(|e: String| anyhow!(e))?,
            points_delta: row.points_delta,
            mass_kg: row.mass_kg,
            waste_type_id: row.waste_type_id,
            timestamp: parse_ts(&row.timestamp)?,
            reference_id: row.reference_id,
        })
    }
}

pub struct ClaimSessionRow {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub social_account_id: Option<String>,
    pub gift_code: Option<String>,
    pub tweet_reference: Option<String>,
    pub mint_tx_reference: Option<String>,
    pub wallet_address: Option<String>,
    pub message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub checking_started_at: Option<String>,
}

impl TryFrom<ClaimSessionRow> for ClaimSession {
    type Error = anyhow::Error;

    fn try_from(row: ClaimSessionRow) -> Result<Self> {
        Ok(ClaimSession {
            id: row
                .id
                .parse::<Uuid>()
                .map_err(|e| anyhow!("Corrupt session id '{}': {}", row.id, e))?,
            user_id: row.user_id,
            status: row.status.parse().map_err(|e: String| anyhow!(e))?,
            social_account_id: row.social_account_id,
            gift_code: row.gift_code,
            tweet_reference: row.tweet_reference,
            mint_tx_reference: row.mint_tx_reference,
            wallet_address: row.wallet_address,
            message: row.message,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            checking_started_at: parse_opt_ts(row.checking_started_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_as_text() {
        let early = DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = early + chrono::Duration::microseconds(1);
        assert!(fmt_ts(&early) < fmt_ts(&late));
        assert_eq!(fmt_ts(&early), "2024-01-15T10:30:00.000000Z");
        assert_eq!(parse_ts(&fmt_ts(&late)).unwrap(), late);
    }

    #[test]
    fn corrupt_kind_is_rejected() {
        let row = LedgerRow {
            seq: 1,
            id: Uuid::new_v4().to_string(),
            user_id: "u".into(),
            kind: "airdrop".into(),
            points_delta: 5,
            mass_kg: None,
            waste_type_id: None,
            timestamp: "2024-01-15T10:30:00.000000Z".into(),
            reference_id: None,
        };
        assert!(LedgerEntry::try_from(row).is_err());
    }
}
