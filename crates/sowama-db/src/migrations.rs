use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE waste_types (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                color       TEXT NOT NULL DEFAULT '#8FD275'
            );

            -- Append-only: a rate change inserts the next version
            CREATE TABLE waste_type_rates (
                waste_type_id   TEXT NOT NULL REFERENCES waste_types(id),
                version         INTEGER NOT NULL,
                points_per_kg   REAL NOT NULL CHECK (points_per_kg > 0),
                effective_from  TEXT NOT NULL,
                set_by          TEXT NOT NULL,
                PRIMARY KEY (waste_type_id, version)
            );

            CREATE INDEX idx_rates_effective
                ON waste_type_rates(waste_type_id, effective_from);

            CREATE TABLE ledger_entries (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT NOT NULL UNIQUE,
                user_id         TEXT NOT NULL,
                kind            TEXT NOT NULL,
                points_delta    INTEGER NOT NULL,
                mass_kg         REAL,
                waste_type_id   TEXT,
                timestamp       TEXT NOT NULL,
                reference_id    TEXT
            );

            CREATE INDEX idx_ledger_user
                ON ledger_entries(user_id, timestamp, id);
            CREATE INDEX idx_ledger_user_seq
                ON ledger_entries(user_id, seq);

            -- Running balance, written in the same transaction as each entry
            CREATE TABLE user_balances (
                user_id     TEXT PRIMARY KEY,
                balance     INTEGER NOT NULL CHECK (balance >= 0),
                entry_count INTEGER NOT NULL
            );

            CREATE TABLE token_values (
                seq           INTEGER PRIMARY KEY AUTOINCREMENT,
                value         REAL NOT NULL CHECK (value > 0),
                currency      TEXT NOT NULL DEFAULT 'USD',
                effective_at  TEXT NOT NULL,
                actor         TEXT NOT NULL
            );

            CREATE INDEX idx_token_values_effective
                ON token_values(effective_at);

            CREATE TABLE products (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                points_cost INTEGER NOT NULL CHECK (points_cost > 0),
                category    TEXT NOT NULL,
                stock       INTEGER CHECK (stock IS NULL OR stock >= 0)
            );

            -- One current session per user, updated in place
            CREATE TABLE claim_sessions (
                user_id             TEXT PRIMARY KEY,
                id                  TEXT NOT NULL UNIQUE,
                status              TEXT NOT NULL,
                social_account_id   TEXT,
                gift_code           TEXT,
                tweet_reference     TEXT,
                mint_tx_reference   TEXT,
                wallet_address      TEXT,
                message             TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL,
                checking_started_at TEXT
            );

            CREATE INDEX idx_claim_sessions_status
                ON claim_sessions(status);

            CREATE TABLE claim_session_archive (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL,
                status              TEXT NOT NULL,
                social_account_id   TEXT,
                gift_code           TEXT,
                tweet_reference     TEXT,
                mint_tx_reference   TEXT,
                wallet_address      TEXT,
                message             TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL,
                checking_started_at TEXT,
                archived_at         TEXT NOT NULL
            );

            CREATE INDEX idx_claim_archive_user
                ON claim_session_archive(user_id, archived_at);

            CREATE TABLE gift_codes (
                code          TEXT PRIMARY KEY,
                session_id    TEXT NOT NULL,
                user_id       TEXT NOT NULL,
                state         TEXT NOT NULL DEFAULT 'issued',
                issued_at     TEXT NOT NULL,
                submitted_at  TEXT
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (catalog seed)");
        conn.execute_batch(
            "
            INSERT OR IGNORE INTO waste_types (id, name, description, color) VALUES
                ('food_scraps',    'Restos de comida',   'Fruit and vegetable peels, cooked leftovers', '#8FD275'),
                ('garden_waste',   'Residuos de jardin', 'Leaves, grass clippings, small branches',     '#4C9A2A'),
                ('coffee_grounds', 'Cafe y filtros',     'Spent coffee grounds and paper filters',      '#6F4E37'),
                ('eggshells',      'Cascaras de huevo',  'Crushed eggshells',                           '#F2E8CF');

            INSERT OR IGNORE INTO waste_type_rates (waste_type_id, version, points_per_kg, effective_from, set_by) VALUES
                ('food_scraps',    1, 20, '1970-01-01T00:00:00.000000Z', 'seed'),
                ('garden_waste',   1, 15, '1970-01-01T00:00:00.000000Z', 'seed'),
                ('coffee_grounds', 1, 25, '1970-01-01T00:00:00.000000Z', 'seed'),
                ('eggshells',      1, 30, '1970-01-01T00:00:00.000000Z', 'seed');

            INSERT OR IGNORE INTO products (id, name, description, points_cost, category, stock) VALUES
                ('compost-premium', 'Compost Premium', '5 kg of high quality compost', 200, 'garden', 40),
                ('seed-kit',        'Seed Kit',        'Native vegetable seeds',        150, 'garden', 25),
                ('tote-bag',        'Reusable Tote',   'Organic cotton market bag',      80, 'home',   NULL),
                ('tree-planting',   'Plant a Tree',    'A native tree planted for you', 300, 'impact', NULL);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
