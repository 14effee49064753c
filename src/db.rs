use chrono::{DateTime, SecondsFormat, Utc};
use eyre::Result;
use rusqlite::{params, params_from_iter, Connection};

use crate::models::TransferRecord;

// transaction_hash is the primary key: the storage layer is the
// authoritative dedup boundary, the pre-decode exists() check is only an
// optimization. Timestamps are stored as RFC3339 with fixed millisecond
// precision so lexicographic range filters match chronological order.
const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS transfers (
  transaction_hash TEXT PRIMARY KEY,
  contract_address TEXT NOT NULL,
  symbol           TEXT NOT NULL,
  decimals         INTEGER NOT NULL,
  sender           TEXT NOT NULL,
  receiver         TEXT NOT NULL,
  amount           TEXT NOT NULL, -- exact decimal stored as string
  timestamp        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transfers_contract  ON transfers (contract_address);
CREATE INDEX IF NOT EXISTS idx_transfers_sender    ON transfers (sender);
CREATE INDEX IF NOT EXISTS idx_transfers_receiver  ON transfers (receiver);
CREATE INDEX IF NOT EXISTS idx_transfers_timestamp ON transfers (timestamp);
"#;

/// Connect to SQLite (with WAL mode for performance)
pub fn connect(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Run schema migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(INIT_SQL)?;
    Ok(())
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Insert a transfer unless its transaction hash is already recorded.
///
/// A duplicate (including one that raced past the exists() gate from a
/// concurrent delivery) is a successful no-op, never an error.
pub fn insert_if_absent(conn: &Connection, record: &TransferRecord) -> Result<InsertOutcome> {
    let changed = conn.execute(
        r#"
        INSERT OR IGNORE INTO transfers (
            transaction_hash, contract_address, symbol, decimals,
            sender, receiver, amount, timestamp
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            record.transaction_hash,
            record.contract_address,
            record.symbol,
            record.decimals,
            record.sender,
            record.receiver,
            record.amount,
            format_timestamp(&record.timestamp),
        ],
    )?;

    if changed == 0 {
        Ok(InsertOutcome::AlreadyPresent)
    } else {
        Ok(InsertOutcome::Inserted)
    }
}

/// Fast pre-decode dedup check.
pub fn exists_by_hash(conn: &Connection, tx_hash: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM transfers WHERE transaction_hash = ?1)",
        [tx_hash],
        |r| r.get::<_, i64>(0),
    )?;
    Ok(exists != 0)
}

/// Typed history filter; every predicate is an explicit optional field.
#[derive(Debug, Clone, Default)]
pub struct TransferFilter {
    pub symbol: Option<String>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub page: u32,  // 1-based
    pub limit: u32, // rows per page
}

/// Paginated history query: matching transfers newest-first plus the total
/// match count.
pub fn query_transfers(
    conn: &Connection,
    filter: &TransferFilter,
) -> Result<(Vec<TransferRecord>, u64)> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut bound: Vec<String> = Vec::new();

    if let Some(symbol) = &filter.symbol {
        clauses.push("symbol = ?");
        bound.push(symbol.clone());
    }
    if let Some(sender) = &filter.sender {
        clauses.push("sender = ?");
        bound.push(sender.to_lowercase());
    }
    if let Some(receiver) = &filter.receiver {
        clauses.push("receiver = ?");
        bound.push(receiver.to_lowercase());
    }
    if let Some(start) = &filter.start_time {
        clauses.push("timestamp >= ?");
        bound.push(format_timestamp(start));
    }
    if let Some(end) = &filter.end_time {
        clauses.push("timestamp <= ?");
        bound.push(format_timestamp(end));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: u64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM transfers {where_sql}"),
        params_from_iter(bound.iter()),
        |r| r.get::<_, i64>(0),
    )? as u64;

    let page = filter.page.max(1);
    let limit = filter.limit.max(1);
    let offset = (page as i64 - 1) * limit as i64;

    let mut stmt = conn.prepare(&format!(
        "SELECT transaction_hash, contract_address, symbol, decimals,
                sender, receiver, amount, timestamp
         FROM transfers {where_sql}
         ORDER BY timestamp DESC
         LIMIT {limit} OFFSET {offset}"
    ))?;

    let rows = stmt.query_map(params_from_iter(bound.iter()), |r| {
        Ok(TransferRecord {
            transaction_hash: r.get(0)?,
            contract_address: r.get(1)?,
            symbol: r.get(2)?,
            decimals: r.get(3)?,
            sender: r.get(4)?,
            receiver: r.get(5)?,
            amount: r.get(6)?,
            timestamp: parse_timestamp(&r.get::<_, String>(7)?),
        })
    })?;

    let transfers = rows.filter_map(|r| r.ok()).collect();
    Ok((transfers, total))
}

/// Symbol and decimals of the most recently observed transfer for a
/// contract; feeds the metadata endpoint.
pub fn latest_token_metadata(conn: &Connection, address: &str) -> Result<Option<(String, u8)>> {
    let mut stmt = conn.prepare(
        "SELECT symbol, decimals FROM transfers
         WHERE contract_address = ?1
         ORDER BY timestamp DESC
         LIMIT 1",
    )?;
    let mut rows = stmt.query_map([address.to_lowercase()], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, u8>(1)?))
    })?;
    Ok(rows.next().transpose()?)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
