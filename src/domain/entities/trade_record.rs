use crate::domain::entities::direction::Direction;
use crate::domain::errors::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Symbol written for balance rows, which have no instrument.
pub const BALANCE_SYMBOL: &str = "BALANCE";

/// Side of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
    /// External deposit or withdrawal.
    Balance,
}

impl TradeSide {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
            TradeSide::Balance => "BALANCE",
        }
    }
}

impl From<Direction> for TradeSide {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Long => TradeSide::Buy,
            Direction::Short => TradeSide::Sell,
        }
    }
}

impl FromStr for TradeSide {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            "BALANCE" => Ok(TradeSide::Balance),
            other => Err(ValidationError::UnknownDirection(other.to_string())),
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed-trade (or balance) row of the ledger. `ticket` is globally unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ticket: u64,
    pub symbol: String,
    pub side: TradeSide,
    pub volume: f64,
    pub open_price: f64,
    pub open_time: DateTime<Utc>,
    pub close_price: f64,
    pub net_profit: f64,
    pub close_time: DateTime<Utc>,
    pub owner_tag: u64,
}

impl TradeRecord {
    pub fn is_balance(&self) -> bool {
        self.side == TradeSide::Balance
    }
}
