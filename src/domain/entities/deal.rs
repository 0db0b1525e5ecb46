use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of settlement the venue reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealType {
    Buy,
    Sell,
    /// Deposit or withdrawal, not tied to any position.
    Balance,
    /// Credits, charges, corrections and other venue-specific kinds.
    Other(u32),
}

/// Whether a deal opens, closes or reverses a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealEntry {
    In,
    Out,
    InOut,
}

/// Immutable settlement event reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub ticket: u64,
    /// 0 for deals not linked to a position.
    pub position_id: u64,
    pub symbol: String,
    pub deal_type: DealType,
    pub entry: DealEntry,
    pub volume: f64,
    pub price: f64,
    pub profit: f64,
    pub commission: f64,
    pub swap: f64,
    pub timestamp: DateTime<Utc>,
    pub owner_tag: u64,
}

impl Deal {
    /// Settled amount: gross profit net of fees and financing.
    pub fn net_profit(&self) -> f64 {
        self.profit + self.commission + self.swap
    }

    pub fn is_balance(&self) -> bool {
        self.deal_type == DealType::Balance
    }

    /// Buy or sell deal that settles (part of) a position.
    pub fn is_closing(&self) -> bool {
        matches!(self.deal_type, DealType::Buy | DealType::Sell)
            && matches!(self.entry, DealEntry::Out | DealEntry::InOut)
    }

    pub fn is_opening(&self) -> bool {
        matches!(self.deal_type, DealType::Buy | DealType::Sell) && self.entry == DealEntry::In
    }
}

/// Filter for historical deal lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct DealQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub position_id: Option<u64>,
    pub owner_tag: Option<u64>,
}

impl DealQuery {
    pub fn range(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            position_id: None,
            owner_tag: None,
        }
    }

    pub fn for_position(mut self, position_id: u64) -> Self {
        self.position_id = Some(position_id);
        self
    }

    pub fn owned_by(mut self, owner_tag: u64) -> Self {
        self.owner_tag = Some(owner_tag);
        self
    }

    pub fn matches(&self, deal: &Deal) -> bool {
        deal.timestamp >= self.from
            && deal.timestamp <= self.to
            && self.position_id.map_or(true, |id| deal.position_id == id)
            && self.owner_tag.map_or(true, |tag| deal.owner_tag == tag)
    }
}
