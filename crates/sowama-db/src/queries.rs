use std::collections::BTreeMap;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, Transaction, TransactionBehavior, params};
use uuid::Uuid;

use sowama_types::models::{
    ClaimSession, ClaimStatus, EntryKind, HistoryOrder, LedgerEntry, NewEntry, Product,
    TokenValueRecord, WasteType, WasteTypeRate,
};

use crate::Database;
use crate::models::{ClaimSessionRow, LedgerRow, fmt_ts, parse_ts};
use crate::store::{
    AppendOutcome, LedgerTotals, RedeemOutcome, Store, TokenAppendOutcome, Transition,
};

const ENTRY_COLUMNS: &str =
    "seq, id, user_id, kind, points_delta, mass_kg, waste_type_id, timestamp, reference_id";

const SESSION_COLUMNS: &str = "id, user_id, status, social_account_id, gift_code, tweet_reference, \
     mint_tx_reference, wallet_address, message, created_at, updated_at, checking_started_at";

/// Serialized write transaction on the writer connection.
fn begin(conn: &Connection) -> Result<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

impl Store for Database {
    // -- Waste catalog --

    fn waste_types(&self) -> Result<Vec<WasteType>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, description, color FROM waste_types ORDER BY id")?;
            let rows = stmt
                .query_map([], waste_type_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn waste_type(&self, id: &str) -> Result<Option<WasteType>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, description, color FROM waste_types WHERE id = ?1",
                [id],
                waste_type_from_row,
            )
            .optional()
        })
    }

    fn upsert_waste_type(&self, waste_type: &WasteType) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO waste_types (id, name, description, color) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET name = ?2, description = ?3, color = ?4",
                params![
                    waste_type.id,
                    waste_type.name,
                    waste_type.description,
                    waste_type.color
                ],
            )?;
            Ok(())
        })
    }

    fn append_rate(
        &self,
        waste_type_id: &str,
        points_per_kg: f64,
        effective_from: DateTime<Utc>,
        set_by: &str,
    ) -> Result<WasteTypeRate> {
        self.with_conn_mut(|conn| {
            let tx = begin(conn)?;

            let (version, latest): (i64, Option<String>) = tx.query_row(
                "SELECT COALESCE(MAX(version), 0), MAX(effective_from)
                 FROM waste_type_rates WHERE waste_type_id = ?1",
                [waste_type_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;

            // Versions never start before their predecessor
            let mut effective = fmt_ts(&effective_from);
            if let Some(latest) = latest {
                if latest > effective {
                    effective = latest;
                }
            }

            tx.execute(
                "INSERT INTO waste_type_rates (waste_type_id, version, points_per_kg, effective_from, set_by)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![waste_type_id, version + 1, points_per_kg, effective, set_by],
            )?;
            tx.commit()?;

            Ok(WasteTypeRate {
                waste_type_id: waste_type_id.to_string(),
                version: version + 1,
                points_per_kg,
                effective_from: parse_ts(&effective)?,
                set_by: set_by.to_string(),
            })
        })
    }

    fn rate_at(&self, waste_type_id: &str, at: DateTime<Utc>) -> Result<Option<WasteTypeRate>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT waste_type_id, version, points_per_kg, effective_from, set_by
                     FROM waste_type_rates
                     WHERE waste_type_id = ?1 AND effective_from <= ?2
                     ORDER BY effective_from DESC, version DESC
                     LIMIT 1",
                    params![waste_type_id, fmt_ts(&at)],
                    rate_columns,
                )
                .optional()?;
            row.map(into_rate).transpose()
        })
    }

    fn rate_history(&self, waste_type_id: &str) -> Result<Vec<WasteTypeRate>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT waste_type_id, version, points_per_kg, effective_from, set_by
                 FROM waste_type_rates WHERE waste_type_id = ?1 ORDER BY version",
            )?;
            let rows = stmt
                .query_map([waste_type_id], rate_columns)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(into_rate).collect()
        })
    }

    // -- Ledger --

    fn append_entry(&self, entry: &NewEntry) -> Result<AppendOutcome> {
        self.with_conn_mut(|conn| {
            let tx = begin(conn)?;
            let outcome = insert_checked(&tx, entry)?;
            if matches!(outcome, AppendOutcome::Appended { .. }) {
                tx.commit()?;
            }
            Ok(outcome)
        })
    }

    fn redeem_product(
        &self,
        entry_id: Uuid,
        user_id: &str,
        product_id: &str,
        at: DateTime<Utc>,
    ) -> Result<RedeemOutcome> {
        self.with_conn_mut(|conn| {
            let tx = begin(conn)?;

            let Some(product) = query_product(&tx, product_id)? else {
                return Ok(RedeemOutcome::ProductNotFound);
            };
            if product.stock.is_some_and(|stock| stock <= 0) {
                return Ok(RedeemOutcome::OutOfStock);
            }

            let debit = NewEntry {
                id: entry_id,
                user_id: user_id.to_string(),
                kind: EntryKind::Redemption,
                points_delta: -product.points_cost,
                mass_kg: None,
                waste_type_id: None,
                timestamp: at,
                reference_id: Some(product.id.clone()),
            };

            let (entry, balance) = match insert_checked(&tx, &debit)? {
                AppendOutcome::Appended { entry, balance } => (entry, balance),
                AppendOutcome::InsufficientBalance { balance } => {
                    return Ok(RedeemOutcome::InsufficientBalance {
                        balance,
                        cost: product.points_cost,
                    });
                }
            };

            let remaining_stock = match product.stock {
                Some(stock) => {
                    let changed = tx.execute(
                        "UPDATE products SET stock = stock - 1 WHERE id = ?1 AND stock > 0",
                        [&product.id],
                    )?;
                    if changed != 1 {
                        return Ok(RedeemOutcome::OutOfStock);
                    }
                    Some(stock - 1)
                }
                None => None,
            };

            tx.commit()?;
            Ok(RedeemOutcome::Redeemed {
                entry,
                balance,
                remaining_stock,
            })
        })
    }

    fn balance(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| current_balance(conn, user_id))
    }

    fn entries_page(
        &self,
        user_id: &str,
        order: HistoryOrder,
        after_seq: Option<i64>,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>> {
        self.with_conn(|conn| {
            let (sql, cursor) = match order {
                HistoryOrder::OldestFirst => (
                    format!(
                        "SELECT {} FROM ledger_entries WHERE user_id = ?1 AND seq > ?2 ORDER BY seq ASC LIMIT ?3",
                        ENTRY_COLUMNS
                    ),
                    after_seq.unwrap_or(0),
                ),
                HistoryOrder::NewestFirst => (
                    format!(
                        "SELECT {} FROM ledger_entries WHERE user_id = ?1 AND seq < ?2 ORDER BY seq DESC LIMIT ?3",
                        ENTRY_COLUMNS
                    ),
                    after_seq.unwrap_or(i64::MAX),
                ),
            };

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id, cursor, limit], ledger_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(LedgerEntry::try_from).collect()
        })
    }

    fn delivered_mass(&self, user_id: Option<&str>) -> Result<BTreeMap<String, f64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT waste_type_id, SUM(mass_kg) FROM ledger_entries
                 WHERE kind = 'delivery' AND waste_type_id IS NOT NULL
                   AND (?1 IS NULL OR user_id = ?1)
                 GROUP BY waste_type_id",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<f64>>(1)?.unwrap_or(0.0)))
                })?
                .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
            Ok(rows)
        })
    }

    fn ledger_totals(&self) -> Result<LedgerTotals> {
        self.with_conn(|conn| {
            let (users, circulating) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(balance), 0) FROM user_balances",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            let (points_issued, points_spent) = conn.query_row(
                "SELECT COALESCE(SUM(CASE WHEN points_delta > 0 THEN points_delta END), 0),
                        COALESCE(-SUM(CASE WHEN points_delta < 0 THEN points_delta END), 0)
                 FROM ledger_entries",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            Ok(LedgerTotals {
                users,
                points_issued,
                points_spent,
                circulating,
            })
        })
    }

    // -- Token valuation --

    fn append_token_value(&self, record: &TokenValueRecord) -> Result<TokenAppendOutcome> {
        self.with_conn_mut(|conn| {
            let tx = begin(conn)?;

            let latest: Option<String> =
                tx.query_row("SELECT MAX(effective_at) FROM token_values", [], |r| r.get(0))?;
            let effective = fmt_ts(&record.effective_at);
            if let Some(latest) = latest {
                if latest > effective {
                    return Ok(TokenAppendOutcome::Backdated {
                        latest: parse_ts(&latest)?,
                    });
                }
            }

            tx.execute(
                "INSERT INTO token_values (value, currency, effective_at, actor) VALUES (?1, ?2, ?3, ?4)",
                params![record.value, record.currency, effective, record.actor],
            )?;
            tx.commit()?;
            Ok(TokenAppendOutcome::Appended(record.clone()))
        })
    }

    fn token_value_at(&self, at: DateTime<Utc>) -> Result<Option<TokenValueRecord>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT value, currency, effective_at, actor FROM token_values
                     WHERE effective_at <= ?1
                     ORDER BY effective_at DESC, seq DESC
                     LIMIT 1",
                    [fmt_ts(&at)],
                    token_columns,
                )
                .optional()?;
            row.map(into_token_record).transpose()
        })
    }

    fn token_history(&self) -> Result<Vec<TokenValueRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT value, currency, effective_at, actor FROM token_values
                 ORDER BY effective_at ASC, seq ASC",
            )?;
            let rows = stmt
                .query_map([], token_columns)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(into_token_record).collect()
        })
    }

    // -- Products --

    fn products(&self, category: Option<&str>) -> Result<Vec<Product>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, points_cost, category, stock FROM products
                 WHERE (?1 IS NULL OR category = ?1)
                 ORDER BY points_cost, id",
            )?;
            let rows = stmt
                .query_map([category], product_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn product(&self, id: &str) -> Result<Option<Product>> {
        self.with_conn(|conn| query_product(conn, id))
    }

    fn upsert_product(&self, product: &Product) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO products (id, name, description, points_cost, category, stock)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = ?2, description = ?3, points_cost = ?4, category = ?5, stock = ?6",
                params![
                    product.id,
                    product.name,
                    product.description,
                    product.points_cost,
                    product.category,
                    product.stock
                ],
            )?;
            Ok(())
        })
    }

    // -- Claim sessions --

    fn claim_session(&self, user_id: &str) -> Result<Option<ClaimSession>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM claim_sessions WHERE user_id = ?1", SESSION_COLUMNS),
                    [user_id],
                    session_row,
                )
                .optional()?;
            row.map(ClaimSession::try_from).transpose()
        })
    }

    fn replace_claim_session(
        &self,
        session: &ClaimSession,
        archived_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = begin(conn)?;
            archive_current(&tx, &session.user_id, archived_at)?;
            tx.execute(
                &format!(
                    "INSERT INTO claim_sessions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    SESSION_COLUMNS
                ),
                params![
                    session.id.to_string(),
                    session.user_id,
                    session.status.as_str(),
                    session.social_account_id,
                    session.gift_code,
                    session.tweet_reference,
                    session.mint_tx_reference,
                    session.wallet_address,
                    session.message,
                    fmt_ts(&session.created_at),
                    fmt_ts(&session.updated_at),
                    session.checking_started_at.as_ref().map(fmt_ts),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn transition_claim(
        &self,
        session: &ClaimSession,
        expected: ClaimStatus,
    ) -> Result<Transition> {
        self.with_conn_mut(|conn| {
            let tx = begin(conn)?;

            let changed = tx.execute(
                "UPDATE claim_sessions SET
                    status = ?1, social_account_id = ?2, gift_code = ?3, tweet_reference = ?4,
                    mint_tx_reference = ?5, wallet_address = ?6, message = ?7, updated_at = ?8,
                    checking_started_at = ?9
                 WHERE id = ?10 AND status = ?11",
                params![
                    session.status.as_str(),
                    session.social_account_id,
                    session.gift_code,
                    session.tweet_reference,
                    session.mint_tx_reference,
                    session.wallet_address,
                    session.message,
                    fmt_ts(&session.updated_at),
                    session.checking_started_at.as_ref().map(fmt_ts),
                    session.id.to_string(),
                    expected.as_str(),
                ],
            )?;
            if changed == 0 {
                return Ok(Transition::Stale);
            }

            if let Some(code) = &session.gift_code {
                let owner: Option<String> = tx
                    .query_row(
                        "SELECT session_id FROM gift_codes WHERE code = ?1",
                        [code],
                        |r| r.get(0),
                    )
                    .optional()?;
                match owner {
                    Some(owner) if owner != session.id.to_string() => {
                        return Ok(Transition::GiftCodeTaken);
                    }
                    Some(_) => {}
                    None => {
                        tx.execute(
                            "INSERT INTO gift_codes (code, session_id, user_id, issued_at) VALUES (?1, ?2, ?3, ?4)",
                            params![
                                code,
                                session.id.to_string(),
                                session.user_id,
                                fmt_ts(&session.updated_at)
                            ],
                        )?;
                    }
                }
            }

            tx.commit()?;
            Ok(Transition::Applied)
        })
    }

    fn consume_gift_code(&self, code: &str, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE gift_codes SET state = 'submitted', submitted_at = ?2
                 WHERE code = ?1 AND state = 'issued'",
                params![code, fmt_ts(&at)],
            )?;
            Ok(changed == 1)
        })
    }

    fn finalize_mint(
        &self,
        session: &ClaimSession,
        reward: &NewEntry,
    ) -> Result<Option<(LedgerEntry, i64)>> {
        self.with_conn_mut(|conn| {
            let tx = begin(conn)?;

            let changed = tx.execute(
                "UPDATE claim_sessions SET status = 'minted', mint_tx_reference = ?1, message = ?2, updated_at = ?3
                 WHERE id = ?4 AND status = 'minting'",
                params![
                    session.mint_tx_reference,
                    session.message,
                    fmt_ts(&session.updated_at),
                    session.id.to_string(),
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            let (entry, balance) = match insert_checked(&tx, reward)? {
                AppendOutcome::Appended { entry, balance } => (entry, balance),
                AppendOutcome::InsufficientBalance { balance } => {
                    bail!(
                        "NFT reward of {} would leave balance {} negative",
                        reward.points_delta,
                        balance
                    )
                }
            };

            if let Some(code) = &session.gift_code {
                tx.execute("UPDATE gift_codes SET state = 'minted' WHERE code = ?1", [code])?;
            }

            tx.commit()?;
            Ok(Some((entry, balance)))
        })
    }

    fn sessions_with_status(&self, status: ClaimStatus) -> Result<Vec<ClaimSession>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM claim_sessions WHERE status = ?1 ORDER BY updated_at",
                SESSION_COLUMNS
            ))?;
            let rows = stmt
                .query_map([status.as_str()], session_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ClaimSession::try_from).collect()
        })
    }

    fn archive_claim_session(&self, user_id: &str, archived_at: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = begin(conn)?;
            let archived = archive_current(&tx, user_id, archived_at)?;
            tx.commit()?;
            Ok(archived)
        })
    }

    fn claim_history(&self, user_id: &str) -> Result<Vec<ClaimSession>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM claim_session_archive WHERE user_id = ?1
                 ORDER BY archived_at DESC, rowid DESC",
                SESSION_COLUMNS
            ))?;
            let rows = stmt
                .query_map([user_id], session_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ClaimSession::try_from).collect()
        })
    }
}

/// Balance check and insert. Caller owns the transaction.
fn insert_checked(conn: &Connection, entry: &NewEntry) -> Result<AppendOutcome> {
    let balance = current_balance(conn, &entry.user_id)?;
    let next = balance
        .checked_add(entry.points_delta)
        .ok_or_else(|| anyhow!("Balance overflow for user {}", entry.user_id))?;
    if next < 0 {
        return Ok(AppendOutcome::InsufficientBalance { balance });
    }

    // A user's timestamps never go backwards along seq
    let last: Option<String> = conn.query_row(
        "SELECT MAX(timestamp) FROM ledger_entries WHERE user_id = ?1",
        [&entry.user_id],
        |r| r.get(0),
    )?;
    let mut timestamp = fmt_ts(&entry.timestamp);
    if let Some(last) = last {
        if last > timestamp {
            timestamp = last;
        }
    }

    conn.execute(
        "INSERT INTO ledger_entries (id, user_id, kind, points_delta, mass_kg, waste_type_id, timestamp, reference_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id.to_string(),
            entry.user_id,
            entry.kind.as_str(),
            entry.points_delta,
            entry.mass_kg,
            entry.waste_type_id,
            timestamp,
            entry.reference_id,
        ],
    )?;
    let seq = conn.last_insert_rowid();

    conn.execute(
        "INSERT INTO user_balances (user_id, balance, entry_count) VALUES (?1, ?2, 1)
         ON CONFLICT(user_id) DO UPDATE SET balance = ?2, entry_count = entry_count + 1",
        params![entry.user_id, next],
    )?;

    Ok(AppendOutcome::Appended {
        entry: LedgerEntry {
            id: entry.id,
            seq,
            user_id: entry.user_id.clone(),
            kind: entry.kind,
            points_delta: entry.points_delta,
            mass_kg: entry.mass_kg,
            waste_type_id: entry.waste_type_id.clone(),
            timestamp: parse_ts(&timestamp)?,
            reference_id: entry.reference_id.clone(),
        },
        balance: next,
    })
}

fn current_balance(conn: &Connection, user_id: &str) -> Result<i64> {
    let balance = conn
        .query_row(
            "SELECT balance FROM user_balances WHERE user_id = ?1",
            [user_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(balance.unwrap_or(0))
}

fn archive_current(conn: &Connection, user_id: &str, archived_at: DateTime<Utc>) -> Result<bool> {
    let archived = conn.execute(
        &format!(
            "INSERT INTO claim_session_archive ({cols}, archived_at)
             SELECT {cols}, ?2 FROM claim_sessions WHERE user_id = ?1",
            cols = SESSION_COLUMNS
        ),
        params![user_id, fmt_ts(&archived_at)],
    )?;
    conn.execute("DELETE FROM claim_sessions WHERE user_id = ?1", [user_id])?;
    Ok(archived > 0)
}

fn query_product(conn: &Connection, id: &str) -> Result<Option<Product>> {
    conn.query_row(
        "SELECT id, name, description, points_cost, category, stock FROM products WHERE id = ?1",
        [id],
        product_from_row,
    )
    .optional()
}

fn waste_type_from_row(row: &Row<'_>) -> rusqlite::Result<WasteType> {
    Ok(WasteType {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        color: row.get(3)?,
    })
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        points_cost: row.get(3)?,
        category: row.get(4)?,
        stock: row.get(5)?,
    })
}

type RateColumns = (String, i64, f64, String, String);

fn rate_columns(row: &Row<'_>) -> rusqlite::Result<RateColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_rate(
    (waste_type_id, version, points_per_kg, effective_from, set_by): RateColumns,
) -> Result<WasteTypeRate> {
    Ok(WasteTypeRate {
        waste_type_id,
        version,
        points_per_kg,
        effective_from: parse_ts(&effective_from)?,
        set_by,
    })
}

type TokenColumns = (f64, String, String, String);

fn token_columns(row: &Row<'_>) -> rusqlite::Result<TokenColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_token_record(
    (value, currency, effective_at, actor): TokenColumns,
) -> Result<TokenValueRecord> {
    Ok(TokenValueRecord {
        value,
        currency,
        effective_at: parse_ts(&effective_at)?,
        actor,
    })
}

fn ledger_row(row: &Row<'_>) -> rusqlite::Result<LedgerRow> {
    Ok(LedgerRow {
        seq: row.get(0)?,
        id: row.get(1)?,
        user_id: row.get(2)?,
        kind: row.get(3)?,
        points_delta: row.get(4)?,
        mass_kg: row.get(5)?,
        waste_type_id: row.get(6)?,
        timestamp: row.get(7)?,
        reference_id: row.get(8)?,
    })
}

fn session_row(row: &Row<'_>) -> rusqlite::Result<ClaimSessionRow> {
    Ok(ClaimSessionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status: row.get(2)?,
        social_account_id: row.get(3)?,
        gift_code: row.get(4)?,
        tweet_reference: row.get(5)?,
        mint_tx_reference: row.get(6)?,
        wallet_address: row.get(7)?,
        message: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        checking_started_at: row.get(11)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
