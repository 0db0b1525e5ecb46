//! Database Models
//!
//! Row types for the ledger tables and their conversion to domain types.

use crate::domain::entities::position::Position;
use crate::domain::entities::telemetry::{BotStatus, MonitoringSnapshot};
use crate::domain::entities::trade_record::{TradeRecord, TradeSide};
use crate::domain::errors::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Trade row in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRow {
    pub ticket: i64,
    pub symbol: String,
    pub side: String, // "BUY", "SELL" or "BALANCE"
    pub volume: f64,
    pub open_price: f64,
    pub open_time: DateTime<Utc>,
    pub close_price: f64,
    pub net_profit: f64,
    pub close_time: DateTime<Utc>,
    pub owner_tag: i64,
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<TradeRow> for TradeRecord {
    type Error = LedgerError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        let side: TradeSide = row
            .side
            .parse()
            .map_err(|_| LedgerError::CorruptRow(format!("trade {} has side '{}'", row.ticket, row.side)))?;
        Ok(TradeRecord {
            ticket: row.ticket as u64,
            symbol: row.symbol,
            side,
            volume: row.volume,
            open_price: row.open_price,
            open_time: row.open_time,
            close_price: row.close_price,
            net_profit: row.net_profit,
            close_time: row.close_time,
            owner_tag: row.owner_tag as u64,
        })
    }
}

/// Mirrored open position
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LivePositionRow {
    pub ticket: i64,
    pub symbol: String,
    pub direction: String, // "BUY" or "SELL"
    pub volume: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub unrealized_profit: f64,
    pub owner_tag: i64,
    pub mirrored_at: DateTime<Utc>,
}

impl TryFrom<LivePositionRow> for Position {
    type Error = LedgerError;

    fn try_from(row: LivePositionRow) -> Result<Self, Self::Error> {
        let direction = row.direction.parse().map_err(|_| {
            LedgerError::CorruptRow(format!("position {} has direction '{}'", row.ticket, row.direction))
        })?;
        Ok(Position {
            ticket: row.ticket as u64,
            symbol: row.symbol,
            direction,
            volume: row.volume,
            entry_price: row.entry_price,
            current_price: row.current_price,
            stop_price: row.stop_price,
            target_price: row.target_price,
            opened_at: row.opened_at,
            unrealized_profit: row.unrealized_profit,
            owner_tag: row.owner_tag as u64,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BotStatusRow {
    pub last_ping: DateTime<Utc>,
    pub is_active: bool,
    pub balance: f64,
    pub equity: f64,
}

impl From<BotStatusRow> for BotStatus {
    fn from(row: BotStatusRow) -> Self {
        BotStatus {
            last_ping: row.last_ping,
            is_active: row.is_active,
            balance: row.balance,
            equity: row.equity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MonitoringRow {
    pub symbol: String,
    pub price: f64,
    pub indicator_value: f64,
    pub oracle_probability: f64,
    pub decision_status: String,
    pub updated_at: DateTime<Utc>,
}

impl From<MonitoringRow> for MonitoringSnapshot {
    fn from(row: MonitoringRow) -> Self {
        MonitoringSnapshot {
            symbol: row.symbol,
            price: row.price,
            indicator_value: row.indicator_value,
            oracle_probability: row.oracle_probability,
            decision_status: row.decision_status,
            updated_at: row.updated_at,
        }
    }
}

/// Aggregate figures read by the reporting side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Sum over every row, balance movements included
    pub total_net_profit: f64,
    /// Closed trades only
    pub trade_count: i64,
    pub winning_trades: i64,
    /// Winning share of closed trades, 0 when there are none
    pub win_rate: f64,
}
