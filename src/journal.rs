//! Write-only score journal (spec §6 Persistence): `(timestamp, address,
//! score, breakdown_json)`. Grounded on `signals/db_storage.rs`'s
//! WAL-mode `rusqlite::Connection` behind a `parking_lot::Mutex`, pared
//! down to the single append path the spec calls for — no read path, no
//! search index, no background backfill.

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::info;

use crate::model::{Score, TokenRecord};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS score_journal (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at INTEGER NOT NULL,
    address TEXT NOT NULL,
    score REAL NOT NULL,
    breakdown_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_score_journal_address
    ON score_journal(address, recorded_at DESC);
"#;

pub struct ScoreJournal {
    conn: Arc<Mutex<Connection>>,
}

impl ScoreJournal {
    pub fn open(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("opening score journal at {}", db_path))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("initializing score journal schema")?;

        info!(path = db_path, "score journal opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Appends one scored record. Never reads back what it writes; any
    /// query layer is external to the core pipeline (spec §6).
    pub fn record(&self, record: &TokenRecord, score: &Score, recorded_at_unix: i64) -> Result<()> {
        let breakdown_json = serde_json::to_string(&score.breakdown)
            .context("serializing score breakdown")?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO score_journal (recorded_at, address, score, breakdown_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                recorded_at_unix,
                record.address.as_str(),
                score.total,
                breakdown_json,
            ],
        )
        .context("inserting score journal row")?;

        Ok(())
    }

    pub fn len(&self) -> usize {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM score_journal", [], |row| {
            row.get::<_, i64>(0)
        })
        .unwrap_or(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Decision, Fingerprint, TrendClass};
    use std::collections::{HashMap, HashSet};

    fn record() -> TokenRecord {
        TokenRecord {
            address: Fingerprint::new("token"),
            name: "Gem".to_string(),
            symbol: "GEM".to_string(),
            price: Some(1.0),
            market_cap: Some(500_000.0),
            liquidity: Some(50_000.0),
            volume_24h: Some(100_000.0),
            holder_count: Some(500),
            creation_time: Some(chrono::Utc::now()),
            whale_holdings: HashMap::new(),
            top_holders: Vec::new(),
            contract_verified: true,
            mint_frozen: false,
            is_honeypot: false,
            buy_tax_pct: 0.0,
            sell_tax_pct: 0.0,
            risk_factors: HashSet::new(),
            volume_trend: TrendClass::Stable,
            volume_trend_score: 0.5,
            volume_acceleration_pct: 0.0,
            tx_trend: TrendClass::Stable,
            tx_trend_score: 0.5,
            sources_used: HashSet::new(),
            stale_fields: HashSet::new(),
        }
    }

    fn score() -> Score {
        let mut breakdown = HashMap::new();
        breakdown.insert("liquidity".to_string(), 80.0);
        Score {
            total: 82.5,
            breakdown,
            risk_factors: Vec::new(),
            decision: Decision::Alert,
        }
    }

    #[test]
    fn records_append_and_count() {
        let journal = ScoreJournal::open(":memory:").unwrap();
        assert!(journal.is_empty());
        journal.record(&record(), &score(), 1_700_000_000).unwrap();
        assert_eq!(journal.len(), 1);
        journal.record(&record(), &score(), 1_700_000_100).unwrap();
        assert_eq!(journal.len(), 2);
    }
}
