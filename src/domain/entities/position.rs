use crate::domain::entities::direction::Direction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An exposure that is currently open at the venue.
///
/// The venue owns this state. A `Position` only lives as long as the venue
/// reports it open and is rebuilt from the venue every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub current_price: f64,
    /// `None` when the position carries no stop at the venue.
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub unrealized_profit: f64,
    pub owner_tag: u64,
}

impl Position {
    /// Price distance moved in the position's favor since entry.
    pub fn favorable_excursion(&self) -> f64 {
        self.direction
            .favorable_distance(self.entry_price, self.current_price)
    }

    /// True once the stop sits at or beyond entry on the profit side.
    pub fn stop_locks_entry(&self) -> bool {
        match self.stop_price {
            Some(stop) => self.direction.favorable_distance(self.entry_price, stop) >= 0.0,
            None => false,
        }
    }

    pub fn is_owned_by(&self, owner_tag: u64) -> bool {
        self.owner_tag == owner_tag
    }
}
