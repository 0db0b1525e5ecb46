//! Ledger Store Trait
//!
//! Contract of the durable store that holds the closed-trade ledger, the
//! open-position mirror, the heartbeat and the monitoring rows. Every call is
//! an independent unit of work; implementations must not hold a connection
//! across calls.

use crate::domain::entities::position::Position;
use crate::domain::entities::telemetry::{BotStatus, MonitoringSnapshot};
use crate::domain::entities::trade_record::TradeRecord;
use crate::domain::errors::LedgerError;
use async_trait::async_trait;
use std::collections::HashSet;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Overwrite the heartbeat singleton.
    async fn upsert_status(&self, status: &BotStatus) -> LedgerResult<()>;

    /// Insert one record unless its ticket is already present.
    /// Returns true when a row was written.
    async fn insert_trade_if_absent(&self, record: &TradeRecord) -> LedgerResult<bool>;

    /// Insert a batch all-or-nothing, skipping tickets already present.
    /// Returns the number of rows written.
    async fn insert_trades_if_absent(&self, records: &[TradeRecord]) -> LedgerResult<usize>;

    /// Subset of `tickets` already recorded.
    async fn known_tickets(&self, tickets: &[u64]) -> LedgerResult<HashSet<u64>>;

    /// Atomically swap the open-position mirror for `positions`.
    async fn replace_open_positions(&self, positions: &[Position]) -> LedgerResult<()>;

    /// Upsert the monitoring row keyed by symbol.
    async fn upsert_monitoring(&self, snapshot: &MonitoringSnapshot) -> LedgerResult<()>;
}
