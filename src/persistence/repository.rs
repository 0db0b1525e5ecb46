//! Database Repository
//!
//! SQLite implementation of the ledger store, plus the read queries the
//! reporting side runs against the same tables.

use super::models::*;
use super::{init_database, DbPool};
use crate::domain::entities::position::Position;
use crate::domain::entities::telemetry::{BotStatus, MonitoringSnapshot};
use crate::domain::entities::trade_record::TradeRecord;
use crate::domain::errors::LedgerError;
use crate::domain::repositories::ledger_store::{LedgerResult, LedgerStore};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashSet;
use tracing::{debug, error};

/// Bound on host parameters per lookup statement
const TICKET_LOOKUP_CHUNK: usize = 500;

fn ledger_error(context: &str, e: sqlx::Error) -> LedgerError {
    error!("{}: {}", context, e);
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            LedgerError::Unavailable(format!("{}: {}", context, e))
        }
        other => LedgerError::Query(format!("{}: {}", context, other)),
    }
}

/// Ledger backed by the SQLite pool
#[derive(Clone)]
pub struct SqliteLedger {
    pool: DbPool,
}

impl SqliteLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open `database_url`, run migrations and wrap the pool.
    pub async fn connect(database_url: &str) -> LedgerResult<Self> {
        Ok(Self::new(init_database(database_url).await?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Number of ledger rows, balance rows included
    pub async fn trade_count(&self) -> LedgerResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ledger_error("Failed to count trades", e))?;
        Ok(count)
    }

    pub async fn get_trade(&self, ticket: u64) -> LedgerResult<Option<TradeRecord>> {
        let row = sqlx::query_as::<_, TradeRow>(
            r#"
            SELECT ticket, symbol, side, volume, open_price, open_time, close_price,
                   net_profit, close_time, owner_tag, recorded_at
            FROM trades WHERE ticket = ?1
            "#,
        )
        .bind(ticket as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ledger_error("Failed to get trade", e))?;

        row.map(TradeRecord::try_from).transpose()
    }

    /// Most recently closed rows first
    pub async fn recent_trades(&self, limit: i64) -> LedgerResult<Vec<TradeRecord>> {
        let rows = sqlx::query_as::<_, TradeRow>(
            r#"
            SELECT ticket, symbol, side, volume, open_price, open_time, close_price,
                   net_profit, close_time, owner_tag, recorded_at
            FROM trades ORDER BY close_time DESC, ticket DESC LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ledger_error("Failed to get recent trades", e))?;

        rows.into_iter().map(TradeRecord::try_from).collect()
    }

    /// Current content of the open-position mirror
    pub async fn open_positions(&self) -> LedgerResult<Vec<Position>> {
        let rows = sqlx::query_as::<_, LivePositionRow>(
            r#"
            SELECT ticket, symbol, direction, volume, entry_price, current_price,
                   stop_price, target_price, opened_at, unrealized_profit, owner_tag, mirrored_at
            FROM live_positions ORDER BY ticket
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ledger_error("Failed to get open positions", e))?;

        rows.into_iter().map(Position::try_from).collect()
    }

    pub async fn bot_status(&self) -> LedgerResult<Option<BotStatus>> {
        let row = sqlx::query_as::<_, BotStatusRow>(
            "SELECT last_ping, is_active, balance, equity FROM bot_status WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ledger_error("Failed to get bot status", e))?;

        Ok(row.map(BotStatus::from))
    }

    pub async fn monitoring(&self) -> LedgerResult<Vec<MonitoringSnapshot>> {
        let rows = sqlx::query_as::<_, MonitoringRow>(
            r#"
            SELECT symbol, price, indicator_value, oracle_probability, decision_status, updated_at
            FROM market_monitoring ORDER BY symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ledger_error("Failed to get monitoring rows", e))?;

        Ok(rows.into_iter().map(MonitoringSnapshot::from).collect())
    }

    pub async fn summary(&self) -> LedgerResult<LedgerSummary> {
        let (total_net_profit,): (f64,) =
            sqlx::query_as("SELECT COALESCE(SUM(net_profit), 0.0) FROM trades")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| ledger_error("Failed to sum net profit", e))?;

        let (trade_count, winning_trades): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN net_profit > 0 THEN 1 ELSE 0 END), 0)
            FROM trades WHERE side != 'BALANCE'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ledger_error("Failed to count closed trades", e))?;

        let win_rate = if trade_count > 0 {
            winning_trades as f64 / trade_count as f64
        } else {
            0.0
        };

        Ok(LedgerSummary {
            total_net_profit,
            trade_count,
            winning_trades,
            win_rate,
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn upsert_status(&self, status: &BotStatus) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bot_status (id, last_ping, is_active, balance, equity)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                last_ping = excluded.last_ping,
                is_active = excluded.is_active,
                balance = excluded.balance,
                equity = excluded.equity
            "#,
        )
        .bind(status.last_ping)
        .bind(status.is_active)
        .bind(status.balance)
        .bind(status.equity)
        .execute(&self.pool)
        .await
        .map_err(|e| ledger_error("Failed to upsert bot status", e))?;

        debug!(active = status.is_active, "Heartbeat written");
        Ok(())
    }

    async fn insert_trade_if_absent(&self, record: &TradeRecord) -> LedgerResult<bool> {
        Ok(self.insert_trades_if_absent(std::slice::from_ref(record)).await? == 1)
    }

    async fn insert_trades_if_absent(&self, records: &[TradeRecord]) -> LedgerResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let recorded_at = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ledger_error("Failed to begin trade batch", e))?;

        let mut inserted = 0usize;
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO trades (
                    ticket, symbol, side, volume, open_price, open_time,
                    close_price, net_profit, close_time, owner_tag, recorded_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(ticket) DO NOTHING
                "#,
            )
            .bind(record.ticket as i64)
            .bind(&record.symbol)
            .bind(record.side.as_str())
            .bind(record.volume)
            .bind(record.open_price)
            .bind(record.open_time)
            .bind(record.close_price)
            .bind(record.net_profit)
            .bind(record.close_time)
            .bind(record.owner_tag as i64)
            .bind(recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| ledger_error("Failed to insert trade", e))?;

            inserted += result.rows_affected() as usize;
        }

        tx.commit()
            .await
            .map_err(|e| ledger_error("Failed to commit trade batch", e))?;

        debug!("Inserted {} of {} trade records", inserted, records.len());
        Ok(inserted)
    }

    async fn known_tickets(&self, tickets: &[u64]) -> LedgerResult<HashSet<u64>> {
        let mut known = HashSet::new();
        for chunk in tickets.chunks(TICKET_LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT ticket FROM trades WHERE ticket IN (");
            let mut separated = builder.separated(", ");
            for ticket in chunk {
                separated.push_bind(*ticket as i64);
            }
            separated.push_unseparated(")");

            let rows: Vec<(i64,)> = builder
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ledger_error("Failed to look up known tickets", e))?;
            known.extend(rows.into_iter().map(|(ticket,)| ticket as u64));
        }
        Ok(known)
    }

    async fn replace_open_positions(&self, positions: &[Position]) -> LedgerResult<()> {
        let mirrored_at = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ledger_error("Failed to begin mirror swap", e))?;

        sqlx::query("DELETE FROM live_positions")
            .execute(&mut *tx)
            .await
            .map_err(|e| ledger_error("Failed to clear position mirror", e))?;

        for position in positions {
            sqlx::query(
                r#"
                INSERT INTO live_positions (
                    ticket, symbol, direction, volume, entry_price, current_price,
                    stop_price, target_price, opened_at, unrealized_profit, owner_tag, mirrored_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(position.ticket as i64)
            .bind(&position.symbol)
            .bind(position.direction.as_str())
            .bind(position.volume)
            .bind(position.entry_price)
            .bind(position.current_price)
            .bind(position.stop_price)
            .bind(position.target_price)
            .bind(position.opened_at)
            .bind(position.unrealized_profit)
            .bind(position.owner_tag as i64)
            .bind(mirrored_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| ledger_error("Failed to insert mirrored position", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| ledger_error("Failed to commit mirror swap", e))?;
        Ok(())
    }

    async fn upsert_monitoring(&self, snapshot: &MonitoringSnapshot) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO market_monitoring (
                symbol, price, indicator_value, oracle_probability, decision_status, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(symbol) DO UPDATE SET
                price = excluded.price,
                indicator_value = excluded.indicator_value,
                oracle_probability = excluded.oracle_probability,
                decision_status = excluded.decision_status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&snapshot.symbol)
        .bind(snapshot.price)
        .bind(snapshot.indicator_value)
        .bind(snapshot.oracle_probability)
        .bind(&snapshot.decision_status)
        .bind(snapshot.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ledger_error("Failed to upsert monitoring row", e))?;
        Ok(())
    }
}
