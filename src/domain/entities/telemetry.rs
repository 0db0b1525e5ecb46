use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Heartbeat singleton, overwritten every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStatus {
    pub last_ping: DateTime<Utc>,
    pub is_active: bool,
    pub balance: f64,
    pub equity: f64,
}

/// Latest evaluation of a watched instrument, one row per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSnapshot {
    pub symbol: String,
    pub price: f64,
    /// Momentum indicator (RSI) at the last closed bar.
    pub indicator_value: f64,
    pub oracle_probability: f64,
    pub decision_status: String,
    pub updated_at: DateTime<Utc>,
}
